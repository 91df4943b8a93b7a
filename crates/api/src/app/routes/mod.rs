use axum::Router;

pub mod holds;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod products;
pub mod system;

/// Router for every reservation endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/holds", holds::router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .merge(metrics::router())
}
