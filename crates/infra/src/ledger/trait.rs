use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stocklock_core::{ExpectedVersion, ProductId};
use stocklock_inventory::{NewOrder, Order, Product};

/// Ledger store operation error.
///
/// These are **storage errors** (missing rows, lost updates, backend failures)
/// as opposed to business outcomes such as insufficient stock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("product {0} not found")]
    NotFound(ProductId),

    /// A version-checked write found the row at a different version.
    #[error("version conflict on product {product_id}: expected {expected}, found {actual}")]
    VersionConflict {
        product_id: ProductId,
        expected: i64,
        actual: i64,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Unit of work holding an exclusive lock on one product row.
///
/// The lock is held until `commit` or `rollback`. Dropping the unit without
/// committing rolls it back: staged writes are discarded and the lock released.
#[async_trait]
pub trait ProductUnit: Send {
    /// The locked row as of the latest read or write in this unit.
    fn product(&self) -> &Product;

    /// Plain (unchecked) write of the locked row; visible to others on commit.
    ///
    /// Returns the product stamped with its new version.
    async fn write_product(&mut self, product: Product) -> Result<Product, StoreError>;

    /// Audit unit opened together with this one, if the store reserves one.
    ///
    /// Recording through it needs no further store resources while the row
    /// lock is held. Yields the unit at most once.
    fn take_reserved_audit(&mut self) -> Option<Box<dyn AuditUnit>> {
        None
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Unit of work for audit records that commits independently of any other
/// unit held by the caller.
#[async_trait]
pub trait AuditUnit: Send {
    /// Append an order record; the store assigns its id.
    async fn append_order(&mut self, order: NewOrder) -> Result<Order, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Durable storage for products and order audit records.
///
/// ## Write semantics
///
/// - every successful product write increments `version` by exactly one
/// - `write_product_if_version` checks the version synchronously: a mismatch is
///   reported by the call itself, never deferred to a later commit
/// - a version-checked write waits for any exclusive lock on the same row
///
/// ## Audit semantics
///
/// Units from `begin_independent` never share a transaction with a
/// `ProductUnit`. Rolling back a product unit does not affect audit records
/// committed while it was open.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Plain read, no lock.
    async fn read_product(&self, id: ProductId) -> Result<Product, StoreError>;

    /// Read a product under an exclusive lock, blocking while another unit
    /// holds it.
    async fn begin_locked(&self, id: ProductId) -> Result<Box<dyn ProductUnit>, StoreError>;

    /// Write `product` if the stored version satisfies `expected`.
    ///
    /// Returns the product stamped with its new version.
    async fn write_product_if_version(
        &self,
        product: Product,
        expected: ExpectedVersion,
    ) -> Result<Product, StoreError>;

    async fn begin_independent(&self) -> Result<Box<dyn AuditUnit>, StoreError>;

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Overwrite (or create) `products` exactly as given and purge every order
    /// record, atomically.
    async fn reset(&self, products: &[Product]) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn read_product(&self, id: ProductId) -> Result<Product, StoreError> {
        (**self).read_product(id).await
    }

    async fn begin_locked(&self, id: ProductId) -> Result<Box<dyn ProductUnit>, StoreError> {
        (**self).begin_locked(id).await
    }

    async fn write_product_if_version(
        &self,
        product: Product,
        expected: ExpectedVersion,
    ) -> Result<Product, StoreError> {
        (**self).write_product_if_version(product, expected).await
    }

    async fn begin_independent(&self) -> Result<Box<dyn AuditUnit>, StoreError> {
        (**self).begin_independent().await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        (**self).list_orders().await
    }

    async fn reset(&self, products: &[Product]) -> Result<(), StoreError> {
        (**self).reset(products).await
    }
}
