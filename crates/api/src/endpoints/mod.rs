//! API endpoints.

mod admin;
mod products;
mod waste;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/waste", waste::router())
        .nest("/products", products::router())
        .nest("/admin", admin::router())
}
