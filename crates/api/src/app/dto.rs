use serde::{Deserialize, Serialize};

use stocklock_core::{OrderId, ProductId};
use stocklock_infra::OrderReceipt;
use stocklock_inventory::{OrderStats, PlaceOrder, Product};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub product_id: i64,
    pub quantity: i64,
    pub user_id: String,
}

impl OrderRequest {
    pub fn into_command(self) -> PlaceOrder {
        PlaceOrder::new(ProductId::new(self.product_id), self.quantity, self.user_id)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub stock_remaining: i64,
    /// Only populated by the optimistic strategy.
    pub new_version: Option<i64>,
}

impl From<OrderReceipt> for OrderResponse {
    fn from(r: OrderReceipt) -> Self {
        Self {
            order_id: r.order_id,
            product_id: r.product_id,
            quantity_ordered: r.quantity_ordered,
            stock_remaining: r.stock_remaining,
            new_version: r.new_version,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatsResponse {
    pub total_orders: u64,
    pub successful_orders: u64,
    pub failed_out_of_stock: u64,
    pub failed_conflict: u64,
}

impl From<OrderStats> for OrderStatsResponse {
    fn from(s: OrderStats) -> Self {
        Self {
            total_orders: s.total_orders,
            successful_orders: s.successful_orders,
            failed_out_of_stock: s.failed_out_of_stock,
            failed_conflict: s.failed_conflict,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub stock: i64,
    pub version: i64,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        use stocklock_core::Versioned;

        Self {
            id: p.id_typed(),
            name: p.name().to_string(),
            stock: p.stock(),
            version: p.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_request_reads_camel_case() {
        let req: OrderRequest =
            serde_json::from_value(json!({"productId": 1, "quantity": 2, "userId": "u-1"})).unwrap();
        let cmd = req.into_command();
        assert_eq!(cmd.product_id, ProductId::new(1));
        assert_eq!(cmd.quantity, 2);
        assert_eq!(cmd.user_id.as_str(), "u-1");
    }

    #[test]
    fn pessimistic_receipt_serializes_null_version() {
        let body = serde_json::to_value(OrderResponse::from(OrderReceipt {
            order_id: OrderId::new(7),
            product_id: ProductId::new(1),
            quantity_ordered: 3,
            stock_remaining: 97,
            new_version: None,
        }))
        .unwrap();

        assert_eq!(
            body,
            json!({
                "orderId": 7,
                "productId": 1,
                "quantityOrdered": 3,
                "stockRemaining": 97,
                "newVersion": null,
            })
        );
    }
}
