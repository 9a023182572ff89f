//! Audit recorder: one immutable order record per terminal outcome.

use tracing::{debug, instrument};

use stocklock_inventory::{Order, OrderStatus, PlaceOrder};

use crate::ledger::{AuditUnit, LedgerStore, ProductUnit, StoreError};

/// Writes order outcome records in their own unit of work.
///
/// Each record is committed by a task spawned onto the runtime, so it neither
/// joins a transaction the caller holds nor gets cut short if the caller's
/// future is dropped mid-write. No retries: a failed write is returned as-is.
#[derive(Debug, Clone)]
pub struct AuditRecorder<S> {
    store: S,
}

impl<S> AuditRecorder<S>
where
    S: LedgerStore + Clone + 'static,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn record(&self, request: &PlaceOrder, status: OrderStatus) -> Result<Order, StoreError> {
        self.record_in(None, request, status).await
    }

    /// Record an outcome on behalf of a lock holder, through the audit unit the
    /// store reserved with the lock when it has one.
    pub async fn record_for(
        &self,
        locked: &mut dyn ProductUnit,
        request: &PlaceOrder,
        status: OrderStatus,
    ) -> Result<Order, StoreError> {
        let reserved = locked.take_reserved_audit();
        self.record_in(reserved, request, status).await
    }

    #[instrument(
        skip(self, reserved, request),
        fields(
            product_id = %request.product_id,
            user_id = %request.user_id,
            status = %status,
            reserved = reserved.is_some()
        ),
        err
    )]
    async fn record_in(
        &self,
        reserved: Option<Box<dyn AuditUnit>>,
        request: &PlaceOrder,
        status: OrderStatus,
    ) -> Result<Order, StoreError> {
        let store = self.store.clone();
        let new_order = request.outcome(status);

        let order = tokio::spawn(async move {
            let mut unit = match reserved {
                Some(unit) => unit,
                None => store.begin_independent().await?,
            };
            let order = unit.append_order(new_order).await?;
            unit.commit().await?;
            Ok::<_, StoreError>(order)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("audit task failed: {e}")))??;

        debug!(order_id = %order.id, "order outcome recorded");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stocklock_core::ProductId;

    use crate::ledger::InMemoryLedgerStore;

    #[tokio::test]
    async fn record_appends_exactly_one_order() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let audit = AuditRecorder::new(store.clone());
        let req = PlaceOrder::new(ProductId::new(1), 4, "carol");

        let order = audit.record(&req, OrderStatus::FailedConflict).await.unwrap();
        assert_eq!(order.status, OrderStatus::FailedConflict);
        assert_eq!(order.quantity_ordered, 4);

        let orders = store.list_orders().await.unwrap();
        assert_eq!(orders, vec![order]);
    }

    /// Locked unit that hands out an audit unit opened alongside it.
    struct Reserving {
        inner: Box<dyn ProductUnit>,
        audit: Option<Box<dyn AuditUnit>>,
    }

    #[async_trait::async_trait]
    impl ProductUnit for Reserving {
        fn product(&self) -> &stocklock_inventory::Product {
            self.inner.product()
        }

        async fn write_product(
            &mut self,
            product: stocklock_inventory::Product,
        ) -> Result<stocklock_inventory::Product, StoreError> {
            self.inner.write_product(product).await
        }

        fn take_reserved_audit(&mut self) -> Option<Box<dyn AuditUnit>> {
            self.audit.take()
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    async fn seeded_store() -> Arc<InMemoryLedgerStore> {
        let store = Arc::new(InMemoryLedgerStore::new());
        let widget = stocklock_inventory::Product::new(ProductId::new(1), "Super Widget", 10).unwrap();
        store.reset(&[widget]).await.unwrap();
        store
    }

    #[tokio::test]
    async fn lock_holder_records_through_reserved_unit() {
        let store = seeded_store().await;
        let audit = AuditRecorder::new(store.clone());
        let req = PlaceOrder::new(ProductId::new(1), 2, "dave");

        let mut locked = Reserving {
            inner: store.begin_locked(ProductId::new(1)).await.unwrap(),
            audit: Some(store.begin_independent().await.unwrap()),
        };
        let order = audit
            .record_for(&mut locked, &req, OrderStatus::FailedOutOfStock)
            .await
            .unwrap();
        assert!(locked.audit.is_none());

        // Rolling back the lock holder leaves the record in place.
        Box::new(locked).rollback().await.unwrap();
        assert_eq!(store.list_orders().await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn lock_holder_without_reservation_opens_its_own_unit() {
        let store = seeded_store().await;
        let audit = AuditRecorder::new(store.clone());
        let req = PlaceOrder::new(ProductId::new(1), 2, "dave");

        let mut locked = store.begin_locked(ProductId::new(1)).await.unwrap();
        assert!(locked.take_reserved_audit().is_none());
        audit
            .record_for(locked.as_mut(), &req, OrderStatus::Success)
            .await
            .unwrap();
        locked.rollback().await.unwrap();
        assert_eq!(store.list_orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_surfaces_without_record() {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.fail_next_audits(1);
        let audit = AuditRecorder::new(store.clone());
        let req = PlaceOrder::new(ProductId::new(1), 4, "carol");

        let err = audit.record(&req, OrderStatus::Success).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.list_orders().await.unwrap().is_empty());
    }
}
