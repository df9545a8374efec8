//! HTTP API layer for upcycle-rs.
//!
//! This crate provides the REST API and the submission status stream:
//!
//! - **Endpoints**: waste submissions, products and the admin console
//! - **Extractors**: bearer-token users, suspended-account and admin checks
//! - **Middleware**: token resolution
//! - **Streaming**: Server-Sent Events for submission status
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;

pub use endpoints::router;
pub use middleware::AppState;
