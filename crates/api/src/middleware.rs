//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use upcycle_core::{ModerationService, ProductService, SubmissionService};
use upcycle_db::repositories::UserRepository;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Resolves bearer tokens to users.
    pub user_repo: UserRepository,
    pub submission_service: SubmissionService,
    pub product_service: ProductService,
    pub moderation_service: ModerationService,
}

/// Authentication middleware.
///
/// Resolves `Authorization: Bearer <token>` to a user and stores it in the
/// request extensions. Unknown tokens pass through anonymously; the
/// extractors decide what a handler requires.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get(AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.user_repo.find_by_token(token.trim()).await {
            Ok(Some(user)) => {
                req.extensions_mut().insert(user);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Token lookup failed"),
        }
    }

    next.run(req).await
}
