//! Waste submission endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use upcycle_common::AppResult;
use upcycle_core::{
    SubmissionPage, SubmissionStats, SubmissionStatusView, SubmissionWithIdeas, SubmitResponse,
    SubmitWasteInput,
};

use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{ApiResponse, Deleted, PageQuery, deleted},
    sse,
};

/// Submit a waste stream for analysis. Generation runs in the background.
async fn submit(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<SubmitWasteInput>,
) -> AppResult<(StatusCode, ApiResponse<SubmitResponse>)> {
    let response = state.submission_service.submit(&user.id, input).await?;
    Ok((StatusCode::ACCEPTED, ApiResponse::ok(response)))
}

/// Re-run analysis of an earlier submission, excluding ideas already seen.
async fn reanalyze(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, ApiResponse<SubmitResponse>)> {
    let response = state.submission_service.reanalyze(&id, &user.id).await?;
    Ok((StatusCode::ACCEPTED, ApiResponse::ok(response)))
}

async fn status(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<SubmissionStatusView>> {
    let view = state.submission_service.get_status(&id, &user.id).await?;
    Ok(ApiResponse::ok(view))
}

async fn history(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<SubmissionPage>> {
    let page = state
        .submission_service
        .history(&user.id, query.page, query.limit)
        .await?;
    Ok(ApiResponse::ok(page))
}

async fn stats(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<SubmissionStats>> {
    let stats = state.submission_service.stats(&user.id).await?;
    Ok(ApiResponse::ok(stats))
}

async fn show(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<SubmissionWithIdeas>> {
    let submission = state.submission_service.get(&id, &user.id).await?;
    Ok(ApiResponse::ok(submission))
}

async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Deleted>> {
    state.submission_service.delete(&id, &user.id).await?;
    Ok(deleted())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/submit", post(submit))
        .route("/reanalyze/{id}", post(reanalyze))
        .route("/status/{id}", get(status))
        .route("/status/{id}/stream", get(sse::submission_status))
        .route("/history", get(history))
        .route("/stats", get(stats))
        .route("/{id}", get(show).delete(delete))
}
