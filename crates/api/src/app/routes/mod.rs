use axum::Router;

pub mod batches;
pub mod invoices;
pub mod products;
pub mod system;

/// Router for every catalog endpoint.
pub fn router() -> Router {
    Router::new().nest("/invoices", invoices::router())
}
