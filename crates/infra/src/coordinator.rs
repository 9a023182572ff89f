//! Inventory coordinator: concurrency control for stock decrements.
//!
//! Two placement strategies share the same audit discipline (exactly one order
//! record per terminal outcome, committed independently of the stock write):
//!
//! ```text
//! pessimistic:  lock row ─► check stock ─► write ─► audit SUCCESS ─► commit
//!                              └─► audit FAILED_OUT_OF_STOCK ─► rollback
//!
//! optimistic:   ┌─► read ─► check stock ─► versioned write ─► audit SUCCESS
//!               │              └─► audit FAILED_OUT_OF_STOCK (terminal)
//!               └── conflict ◄── backoff ◄─┘  (after max attempts: audit FAILED_CONFLICT)
//! ```
//!
//! The coordinator keeps no state between calls; all coordination goes through
//! the store's row locks and version checks.

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use stocklock_core::{DomainError, ExpectedVersion, OrderId, ProductId, Versioned};
use stocklock_inventory::{OrderStats, OrderStatus, PlaceOrder, Product, SeedCatalog};

use crate::audit::AuditRecorder;
use crate::ledger::{LedgerStore, StoreError};
use crate::retry::RetryPolicy;

/// Failure of a coordinator operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Business outcome; always paired with a `FAILED_OUT_OF_STOCK` record.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// Business outcome; always paired with a `FAILED_CONFLICT` record.
    #[error(
        "failed to place order for product {product_id} due to concurrent modification after {attempts} attempts; please try again"
    )]
    ConcurrencyExhausted { product_id: ProductId, attempts: u32 },

    #[error("order placement was cancelled")]
    Cancelled,

    #[error("invalid order request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for OrderError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => OrderError::ProductNotFound(id),
            other => OrderError::Storage(other),
        }
    }
}

impl From<DomainError> for OrderError {
    fn from(value: DomainError) -> Self {
        OrderError::InvalidRequest(value.to_string())
    }
}

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub stock_remaining: i64,
    /// Version after the write; only reported by the optimistic strategy.
    pub new_version: Option<i64>,
}

/// Outcome of one optimistic attempt. Terminal failures travel as `Err`.
enum Attempt {
    Placed(OrderReceipt),
    Conflict { expected: i64, actual: i64 },
}

/// Places orders against a ledger store and keeps the audit trail.
pub struct InventoryCoordinator<S> {
    store: S,
    audit: AuditRecorder<S>,
    retry: RetryPolicy,
}

impl<S> InventoryCoordinator<S>
where
    S: LedgerStore + Clone + 'static,
{
    pub fn new(store: S) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    pub fn with_retry_policy(store: S, retry: RetryPolicy) -> Self {
        Self {
            audit: AuditRecorder::new(store.clone()),
            store,
            retry,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Place an order under an exclusive row lock.
    pub async fn place_order_pessimistic(&self, request: PlaceOrder) -> Result<OrderReceipt, OrderError> {
        self.place_order_pessimistic_cancellable(request, &CancellationToken::new())
            .await
    }

    /// Like [`Self::place_order_pessimistic`], but gives up with
    /// `OrderError::Cancelled` if `cancel` fires while waiting for the lock.
    #[instrument(
        skip_all,
        fields(product_id = %request.product_id, user_id = %request.user_id, quantity = request.quantity)
    )]
    pub async fn place_order_pessimistic_cancellable(
        &self,
        request: PlaceOrder,
        cancel: &CancellationToken,
    ) -> Result<OrderReceipt, OrderError> {
        request.validate()?;
        info!("attempting pessimistic order");

        let mut unit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("cancelled while waiting for row lock");
                return Err(OrderError::Cancelled);
            }
            unit = self.store.begin_locked(request.product_id) => unit?,
        };

        let product = unit.product().clone();
        let updated = match product.decremented(request.quantity) {
            Ok(updated) => updated,
            Err(DomainError::InvariantViolation(_)) => {
                self.audit
                    .record_for(unit.as_mut(), &request, OrderStatus::FailedOutOfStock)
                    .await?;
                unit.rollback().await?;
                return Err(insufficient(&request, &product));
            }
            Err(e) => return Err(e.into()),
        };

        let written = unit.write_product(updated).await?;
        let order = self
            .audit
            .record_for(unit.as_mut(), &request, OrderStatus::Success)
            .await?;
        unit.commit().await?;

        info!(order_id = %order.id, stock_remaining = written.stock(), "pessimistic order placed");
        Ok(OrderReceipt {
            order_id: order.id,
            product_id: request.product_id,
            quantity_ordered: request.quantity,
            stock_remaining: written.stock(),
            new_version: None,
        })
    }

    /// Place an order with version-checked writes, retrying lost updates with
    /// exponential backoff.
    pub async fn place_order_optimistic(&self, request: PlaceOrder) -> Result<OrderReceipt, OrderError> {
        self.place_order_optimistic_cancellable(request, &CancellationToken::new())
            .await
    }

    /// Like [`Self::place_order_optimistic`], but aborts with
    /// `OrderError::Cancelled` if `cancel` fires during a backoff sleep.
    #[instrument(
        skip_all,
        fields(product_id = %request.product_id, user_id = %request.user_id, quantity = request.quantity)
    )]
    pub async fn place_order_optimistic_cancellable(
        &self,
        request: PlaceOrder,
        cancel: &CancellationToken,
    ) -> Result<OrderReceipt, OrderError> {
        request.validate()?;
        info!("attempting optimistic order");

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt_optimistic(&request).await? {
                Attempt::Placed(receipt) => {
                    info!(
                        order_id = %receipt.order_id,
                        attempt,
                        stock_remaining = receipt.stock_remaining,
                        "optimistic order placed"
                    );
                    return Ok(receipt);
                }
                Attempt::Conflict { expected, actual } => {
                    warn!(attempt, expected, actual, "optimistic locking conflict");

                    if !self.retry.allows_retry_after(attempt) {
                        self.audit.record(&request, OrderStatus::FailedConflict).await?;
                        error!(attempts = attempt, "giving up after repeated conflicts");
                        return Err(OrderError::ConcurrencyExhausted {
                            product_id: request.product_id,
                            attempts: attempt,
                        });
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            warn!(attempt, "cancelled during backoff");
                            return Err(OrderError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn attempt_optimistic(&self, request: &PlaceOrder) -> Result<Attempt, OrderError> {
        let product = self.store.read_product(request.product_id).await?;
        let read_version = product.version();

        let updated = match product.decremented(request.quantity) {
            Ok(updated) => updated,
            Err(DomainError::InvariantViolation(_)) => {
                self.audit.record(request, OrderStatus::FailedOutOfStock).await?;
                return Err(insufficient(request, &product));
            }
            Err(e) => return Err(e.into()),
        };

        let written = match self
            .store
            .write_product_if_version(updated, ExpectedVersion::Exact(read_version))
            .await
        {
            Ok(written) => written,
            Err(StoreError::VersionConflict { expected, actual, .. }) => {
                return Ok(Attempt::Conflict { expected, actual });
            }
            Err(e) => return Err(e.into()),
        };

        let order = self.audit.record(request, OrderStatus::Success).await?;
        Ok(Attempt::Placed(OrderReceipt {
            order_id: order.id,
            product_id: request.product_id,
            quantity_ordered: request.quantity,
            stock_remaining: written.stock(),
            new_version: Some(written.version()),
        }))
    }

    /// Restore `catalog` (stock and `version = 1`) and purge every order record.
    #[instrument(skip_all, fields(product_count = catalog.products().len()))]
    pub async fn reset_inventory(&self, catalog: &SeedCatalog) -> Result<(), OrderError> {
        let products = catalog.to_products()?;
        self.store.reset(&products).await.map_err(OrderError::Storage)?;
        info!("inventory reset to seed values");
        Ok(())
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, OrderError> {
        Ok(self.store.read_product(id).await?)
    }

    /// Outcome counts over a point-in-time snapshot of the order set.
    pub async fn get_order_stats(&self) -> Result<OrderStats, OrderError> {
        let orders = self.store.list_orders().await.map_err(OrderError::Storage)?;
        Ok(OrderStats::tally(&orders))
    }
}

fn insufficient(request: &PlaceOrder, product: &Product) -> OrderError {
    OrderError::InsufficientStock {
        product_id: request.product_id,
        requested: request.quantity,
        available: product.stock(),
    }
}
