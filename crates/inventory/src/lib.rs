//! Inventory entity models.
//!
//! This crate contains the stock-keeping and audit records, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod order;
pub mod product;
pub mod seed;
pub mod stats;

pub use order::{NewOrder, Order, OrderStatus, PlaceOrder};
pub use product::Product;
pub use seed::{SeedCatalog, SeedProduct};
pub use stats::OrderStats;
