use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use stocklock_core::{ExpectedVersion, OrderId, ProductId, Versioned};
use stocklock_inventory::{NewOrder, Order, Product};

use super::r#trait::{AuditUnit, LedgerStore, ProductUnit, StoreError};

#[derive(Debug, Default)]
struct Shared {
    products: RwLock<HashMap<ProductId, Product>>,
    row_locks: Mutex<HashMap<ProductId, Arc<RowLock<()>>>>,
    orders: RwLock<Vec<Order>>,
    last_order_id: AtomicI64,
    audit_faults: AtomicUsize,
}

impl Shared {
    fn row_lock(&self, id: ProductId) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(id).or_default().clone())
    }

    fn get(&self, id: ProductId) -> Result<Product, StoreError> {
        let products = self.products.read().map_err(|_| poisoned())?;
        products.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    fn put(&self, product: Product) -> Result<(), StoreError> {
        let mut products = self.products.write().map_err(|_| poisoned())?;
        products.insert(product.id_typed(), product);
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Row locks are per-product async mutexes (FIFO
/// wakeup); rows and orders live behind `RwLock`s.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` audit appends fail with `StoreError::Unavailable`.
    pub fn fail_next_audits(&self, count: usize) {
        self.shared.audit_faults.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn read_product(&self, id: ProductId) -> Result<Product, StoreError> {
        self.shared.get(id)
    }

    async fn begin_locked(&self, id: ProductId) -> Result<Box<dyn ProductUnit>, StoreError> {
        // Unknown ids fail fast instead of queueing on a lock.
        self.shared.get(id)?;

        let guard = self.shared.row_lock(id)?.lock_owned().await;
        let product = self.shared.get(id)?;

        Ok(Box::new(InMemoryProductUnit {
            shared: self.shared.clone(),
            _guard: guard,
            product,
            dirty: false,
        }))
    }

    async fn write_product_if_version(
        &self,
        product: Product,
        expected: ExpectedVersion,
    ) -> Result<Product, StoreError> {
        let id = product.id_typed();
        let lock = self.shared.row_lock(id)?;
        let _guard = lock.lock().await;

        let current = self.shared.get(id)?;
        if !expected.matches(current.version()) {
            return Err(StoreError::VersionConflict {
                product_id: id,
                expected: match expected {
                    ExpectedVersion::Exact(v) => v,
                    // `Any` matches every version.
                    ExpectedVersion::Any => current.version(),
                },
                actual: current.version(),
            });
        }

        let written = product.with_version(current.version() + 1);
        self.shared.put(written.clone())?;
        Ok(written)
    }

    async fn begin_independent(&self) -> Result<Box<dyn AuditUnit>, StoreError> {
        Ok(Box::new(InMemoryAuditUnit {
            shared: self.shared.clone(),
            staged: Vec::new(),
        }))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.shared.orders.read().map_err(|_| poisoned())?;
        Ok(orders.clone())
    }

    async fn reset(&self, products: &[Product]) -> Result<(), StoreError> {
        let mut ids: Vec<ProductId> = products.iter().map(Product::id_typed).collect();
        ids.sort();
        ids.dedup();

        // Take row locks in id order so concurrent resets cannot deadlock.
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.shared.row_lock(id)?.lock_owned().await);
        }

        let mut rows = self.shared.products.write().map_err(|_| poisoned())?;
        let mut orders = self.shared.orders.write().map_err(|_| poisoned())?;
        for p in products {
            rows.insert(p.id_typed(), p.clone());
        }
        orders.clear();
        Ok(())
    }
}

struct InMemoryProductUnit {
    shared: Arc<Shared>,
    _guard: OwnedMutexGuard<()>,
    product: Product,
    dirty: bool,
}

#[async_trait]
impl ProductUnit for InMemoryProductUnit {
    fn product(&self) -> &Product {
        &self.product
    }

    async fn write_product(&mut self, product: Product) -> Result<Product, StoreError> {
        if product.id_typed() != self.product.id_typed() {
            return Err(StoreError::Unavailable(format!(
                "unit holds product {}, cannot write {}",
                self.product.id_typed(),
                product.id_typed()
            )));
        }
        let written = product.with_version(self.product.version() + 1);
        self.product = written.clone();
        self.dirty = true;
        Ok(written)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.dirty {
            self.shared.put(self.product.clone())?;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

struct InMemoryAuditUnit {
    shared: Arc<Shared>,
    staged: Vec<Order>,
}

#[async_trait]
impl AuditUnit for InMemoryAuditUnit {
    async fn append_order(&mut self, order: NewOrder) -> Result<Order, StoreError> {
        let injected = self
            .shared
            .audit_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected audit failure".to_string()));
        }

        let id = self.shared.last_order_id.fetch_add(1, Ordering::SeqCst) + 1;
        let order = order.into_order(OrderId::new(id), Utc::now());
        self.staged.push(order.clone());
        Ok(order)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut orders = self.shared.orders.write().map_err(|_| poisoned())?;
        orders.extend(self.staged);
        Ok(())
    }
}
