use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::{Instrument, info_span};

use crate::context::{REQUEST_ID_HEADER, RequestId};

/// Assign (or propagate) `x-request-id` and run the request inside a span
/// carrying it.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(RequestId::from_header)
        .unwrap_or_else(RequestId::generate);

    let span = info_span!(
        "http_request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    req.extensions_mut().insert(request_id.clone());

    let mut res = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| tracing::debug!(status = res.status().as_u16(), "request completed"));

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}
