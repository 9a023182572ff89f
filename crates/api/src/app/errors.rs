use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stocklock_infra::OrderError;

pub fn order_error_to_response(err: OrderError) -> axum::response::Response {
    match err {
        OrderError::ProductNotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        OrderError::InsufficientStock { .. } => {
            json_error(StatusCode::BAD_REQUEST, "insufficient_stock", err.to_string())
        }
        OrderError::InvalidRequest(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        OrderError::ConcurrencyExhausted { .. } => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        OrderError::Cancelled => json_error(StatusCode::SERVICE_UNAVAILABLE, "cancelled", err.to_string()),
        OrderError::Storage(e) => {
            tracing::error!(error = %e, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

/// Malformed or incomplete request bodies.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
