use axum::Router;

pub mod orders;
pub mod products;
pub mod system;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/products", products::router())
}
