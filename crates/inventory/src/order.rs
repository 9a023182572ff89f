use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocklock_core::{DomainError, DomainResult, OrderId, ProductId, UserId};

/// Command: place an order for one product quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub product_id: ProductId,
    pub quantity: i64,
    pub user_id: UserId,
}

impl PlaceOrder {
    pub fn new(product_id: ProductId, quantity: i64, user_id: impl Into<UserId>) -> Self {
        Self {
            product_id,
            quantity,
            user_id: user_id.into(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(())
    }

    /// Audit record for the terminal outcome of this request.
    pub fn outcome(&self, status: OrderStatus) -> NewOrder {
        NewOrder {
            product_id: self.product_id,
            quantity_ordered: self.quantity,
            user_id: self.user_id.clone(),
            status,
            created_at: None,
        }
    }
}

/// Terminal classification of an order attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Success,
    FailedOutOfStock,
    FailedConflict,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Success => "SUCCESS",
            OrderStatus::FailedOutOfStock => "FAILED_OUT_OF_STOCK",
            OrderStatus::FailedConflict => "FAILED_CONFLICT",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(OrderStatus::Success),
            "FAILED_OUT_OF_STOCK" => Ok(OrderStatus::FailedOutOfStock),
            "FAILED_CONFLICT" => Ok(OrderStatus::FailedConflict),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// An order record ready to be appended (not yet assigned an id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewOrder {
    /// Assign the store-generated id; `created_at` defaults to `now` when absent.
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Order {
        Order {
            id,
            product_id: self.product_id,
            quantity_ordered: self.quantity_ordered,
            user_id: self.user_id,
            status: self.status,
            created_at: self.created_at.unwrap_or(now),
        }
    }
}

/// Immutable audit record of one order attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}
