use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::{get, post},
};

use stocklock_core::ProductId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/reset", post(reset_inventory))
        .route("/:id", get(get_product))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services.coordinator.get_product(ProductId::new(id)).await {
        Ok(product) => Json(dto::ProductResponse::from(&product)).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

pub async fn reset_inventory(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.coordinator.reset_inventory(&services.seed).await {
        Ok(()) => Json(dto::MessageResponse {
            message: "Product inventory reset successfully.",
        })
        .into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}
