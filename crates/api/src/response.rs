//! API response types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper. Errors are rendered by `AppError`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response.
    pub const fn ok(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Confirmation body for deletions.
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

/// Respond with a deletion confirmation.
#[must_use]
pub const fn deleted() -> ApiResponse<Deleted> {
    ApiResponse::ok(Deleted { deleted: true })
}

/// 1-based paging query, normalized by the services.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default)]
    pub limit: u64,
}

const fn default_page() -> u64 {
    1
}
