//! Ledger store boundary.
//!
//! Durable keyed storage for products and order audit records: plain reads,
//! exclusive-lock reads, version-checked writes, and independently committing
//! units of work.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{AuditUnit, LedgerStore, ProductUnit, StoreError};
