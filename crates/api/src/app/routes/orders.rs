use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/pessimistic", post(place_pessimistic))
        .route("/optimistic", post(place_optimistic))
        .route("/stats", get(order_stats))
}

pub async fn place_pessimistic(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::OrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services
        .coordinator
        .place_order_pessimistic_cancellable(body.into_command(), &services.shutdown)
        .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(dto::OrderResponse::from(receipt))).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

pub async fn place_optimistic(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::OrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services
        .coordinator
        .place_order_optimistic_cancellable(body.into_command(), &services.shutdown)
        .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(dto::OrderResponse::from(receipt))).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

pub async fn order_stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.coordinator.get_order_stats().await {
        Ok(stats) => Json(dto::OrderStatsResponse::from(stats)).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}
