use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderStatus};

/// Outcome counts over a snapshot of the order set.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub successful_orders: u64,
    pub failed_out_of_stock: u64,
    pub failed_conflict: u64,
}

impl OrderStats {
    pub fn record(&mut self, status: OrderStatus) {
        self.total_orders += 1;
        match status {
            OrderStatus::Success => self.successful_orders += 1,
            OrderStatus::FailedOutOfStock => self.failed_out_of_stock += 1,
            OrderStatus::FailedConflict => self.failed_conflict += 1,
        }
    }

    pub fn tally<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut stats = Self::default();
        for order in orders {
            stats.record(order.status);
        }
        stats
    }
}
