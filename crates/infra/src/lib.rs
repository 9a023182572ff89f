//! Infrastructure layer: ledger storage, audit recording, order coordination,
//! configuration.

pub mod audit;
pub mod config;
pub mod coordinator;
pub mod ledger;
pub mod retry;

pub use audit::AuditRecorder;
pub use config::Settings;
pub use coordinator::{InventoryCoordinator, OrderError, OrderReceipt};
pub use ledger::{
    AuditUnit, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, ProductUnit, StoreError,
};
pub use retry::RetryPolicy;
