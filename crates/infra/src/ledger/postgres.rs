//! Postgres-backed ledger store.
//!
//! ## Locking
//!
//! - `begin_locked` opens a transaction and reads the row with `SELECT … FOR UPDATE`;
//!   the row lock is held until that transaction commits or rolls back.
//! - `write_product_if_version` is a single `UPDATE … WHERE version = $expected`.
//!   Zero affected rows means the version moved on (or the row is gone), which is
//!   reported immediately as `StoreError::VersionConflict` / `StoreError::NotFound`.
//! - Every audit unit is its own pool transaction. `orders.product_id` carries no
//!   foreign key: a key-share lock on `products` would queue behind the caller's own
//!   `FOR UPDATE` lock and deadlock the pessimistic path.
//!
//! ## Connection budget
//!
//! A lock holder must be able to write its audit record without waiting on the
//! pool, or a queue of blocked `FOR UPDATE` callers can starve it. `begin_locked`
//! therefore opens the audit transaction *before* taking the row lock and hands
//! it out through `ProductUnit::take_reserved_audit`. At most half the pool may
//! be held by such connection pairs at once (a semaphore), so pairs being
//! assembled can always complete.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database (any code) | `Database` (with operation name and SQLSTATE) |
//! | PoolTimedOut / PoolClosed | `Unavailable` |
//! | Other | `Database` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::instrument;

use stocklock_core::{ExpectedVersion, OrderId, ProductId, UserId, Versioned};
use stocklock_inventory::{NewOrder, Order, OrderStatus, Product};

use super::r#trait::{AuditUnit, LedgerStore, ProductUnit, StoreError};

const CREATE_PRODUCTS: &str = r#"
    CREATE TABLE IF NOT EXISTS products (
        id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        stock BIGINT NOT NULL CHECK (stock >= 0),
        version BIGINT NOT NULL DEFAULT 1
    )
"#;

const CREATE_ORDERS: &str = r#"
    CREATE TABLE IF NOT EXISTS orders (
        id BIGSERIAL PRIMARY KEY,
        product_id BIGINT NOT NULL,
        quantity_ordered BIGINT NOT NULL,
        user_id TEXT NOT NULL,
        status VARCHAR(50) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

/// Postgres-backed ledger store.
///
/// Uses the SQLx connection pool (thread-safe, `Send + Sync`). Each pessimistic
/// caller holds two connections (the locked transaction plus its reserved
/// audit transaction); callers beyond half the pool queue on a semaphore.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
    lockers: Arc<Semaphore>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        let permits = locker_permits(pool.options().get_max_connections());
        Self {
            pool: Arc::new(pool),
            lockers: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Connect a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `products` and `orders` tables if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for ddl in [CREATE_PRODUCTS, CREATE_ORDERS] {
            sqlx::query(ddl)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    async fn current_version(&self, id: ProductId) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT version FROM products WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("current_version", e))?;
        row.map(|r| r.try_get::<i64, _>("version"))
            .transpose()
            .map_err(|e| map_sqlx_error("current_version", e))
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn read_product(&self, id: ProductId) -> Result<Product, StoreError> {
        let row = sqlx::query("SELECT id, name, stock, version FROM products WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("read_product", e))?;

        match row {
            Some(row) => product_from_row(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn begin_locked(&self, id: ProductId) -> Result<Box<dyn ProductUnit>, StoreError> {
        let permit = self
            .lockers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Unavailable("store is shutting down".to_string()))?;

        let audit_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            "SELECT id, name, stock, version FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("select_for_update", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound(id));
        };

        Ok(Box::new(PgProductUnit {
            product: product_from_row(&row)?,
            tx,
            audit: Some(PgAuditUnit { tx: audit_tx }),
            _permit: permit,
        }))
    }

    #[instrument(
        skip(self, product),
        fields(product_id = %product.id_typed(), expected = ?expected),
        err
    )]
    async fn write_product_if_version(
        &self,
        product: Product,
        expected: ExpectedVersion,
    ) -> Result<Product, StoreError> {
        let id = product.id_typed();
        let written = match expected {
            ExpectedVersion::Exact(version) => sqlx::query(
                r#"
                UPDATE products
                SET name = $2, stock = $3, version = version + 1
                WHERE id = $1 AND version = $4
                RETURNING version
                "#,
            )
            .bind(id.get())
            .bind(product.name())
            .bind(product.stock())
            .bind(version),
            ExpectedVersion::Any => sqlx::query(
                r#"
                UPDATE products
                SET name = $2, stock = $3, version = version + 1
                WHERE id = $1
                RETURNING version
                "#,
            )
            .bind(id.get())
            .bind(product.name())
            .bind(product.stock()),
        }
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("write_product_if_version", e))?;

        if let Some(row) = written {
            let version: i64 = row
                .try_get("version")
                .map_err(|e| map_sqlx_error("write_product_if_version", e))?;
            return Ok(product.with_version(version));
        }

        match (expected, self.current_version(id).await?) {
            (ExpectedVersion::Exact(expected), Some(actual)) => Err(StoreError::VersionConflict {
                product_id: id,
                expected,
                actual,
            }),
            _ => Err(StoreError::NotFound(id)),
        }
    }

    async fn begin_independent(&self) -> Result<Box<dyn AuditUnit>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgAuditUnit { tx }))
    }

    #[instrument(skip(self), err)]
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity_ordered, user_id, status, created_at
            FROM orders
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        rows.iter().map(order_from_row).collect()
    }

    #[instrument(skip(self, products), fields(product_count = products.len()), err)]
    async fn reset(&self, products: &[Product]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for p in products {
            sqlx::query(
                r#"
                INSERT INTO products (id, name, stock, version)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id)
                DO UPDATE SET
                    name = EXCLUDED.name,
                    stock = EXCLUDED.stock,
                    version = EXCLUDED.version
                "#,
            )
            .bind(p.id_typed().get())
            .bind(p.name())
            .bind(p.stock())
            .bind(p.version())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_product", e))?;
        }

        sqlx::query("DELETE FROM orders")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_orders", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

struct PgProductUnit {
    tx: Transaction<'static, Postgres>,
    product: Product,
    audit: Option<PgAuditUnit>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl ProductUnit for PgProductUnit {
    fn product(&self) -> &Product {
        &self.product
    }

    async fn write_product(&mut self, product: Product) -> Result<Product, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, stock = $3, version = version + 1
            WHERE id = $1
            RETURNING version
            "#,
        )
        .bind(product.id_typed().get())
        .bind(product.name())
        .bind(product.stock())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("write_product", e))?
        .ok_or(StoreError::NotFound(product.id_typed()))?;

        let version: i64 = row
            .try_get("version")
            .map_err(|e| map_sqlx_error("write_product", e))?;
        self.product = product.with_version(version);
        Ok(self.product.clone())
    }

    fn take_reserved_audit(&mut self) -> Option<Box<dyn AuditUnit>> {
        self.audit
            .take()
            .map(|unit| Box::new(unit) as Box<dyn AuditUnit>)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

struct PgAuditUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AuditUnit for PgAuditUnit {
    async fn append_order(&mut self, order: NewOrder) -> Result<Order, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (product_id, quantity_ordered, user_id, status, created_at)
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()))
            RETURNING id, created_at
            "#,
        )
        .bind(order.product_id.get())
        .bind(order.quantity_ordered)
        .bind(order.user_id.as_str())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_order", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("append_order", e))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| map_sqlx_error("append_order", e))?;

        Ok(NewOrder {
            created_at: Some(created_at),
            ..order
        }
        .into_order(OrderId::new(id), created_at))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

/// Connection pairs allowed at once: half the pool, at least one.
fn locker_permits(max_connections: u32) -> usize {
    (max_connections as usize / 2).max(1)
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("decode_product", e))?;
    let name: String = row.try_get("name").map_err(|e| map_sqlx_error("decode_product", e))?;
    let stock: i64 = row.try_get("stock").map_err(|e| map_sqlx_error("decode_product", e))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| map_sqlx_error("decode_product", e))?;

    Product::restore(ProductId::new(id), name, stock, version)
        .map_err(|e| StoreError::Database(format!("invalid product row {id}: {e}")))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let decode = |e| map_sqlx_error("decode_order", e);
    let status: String = row.try_get("status").map_err(decode)?;
    let status: OrderStatus = status
        .parse()
        .map_err(|e| StoreError::Database(format!("invalid order status: {e}")))?;

    Ok(Order {
        id: OrderId::new(row.try_get("id").map_err(decode)?),
        product_id: ProductId::new(row.try_get("product_id").map_err(decode)?),
        quantity_ordered: row.try_get("quantity_ordered").map_err(decode)?,
        user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(decode)?),
        status,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".to_string());
            StoreError::Database(format!(
                "database error in {} (sqlstate {}): {}",
                operation,
                code,
                db_err.message()
            ))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}
