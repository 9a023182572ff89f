//! `stocklock-core` — shared building blocks for the inventory core.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{OrderId, ProductId, UserId};
pub use version::{ExpectedVersion, Versioned};
