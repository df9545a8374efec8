//! Product endpoints: publishing, the owner's listing, the public catalogue
//! and public abuse reports.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use upcycle_common::AppResult;
use upcycle_core::{MyProducts, PublicProducts, PublishInput, ReportProductInput};
use upcycle_db::entities::{product, report};

use crate::{
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    response::{ApiResponse, Deleted, PageQuery, deleted},
};

/// Publish an idea as a product awaiting verification.
async fn publish(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<PublishInput>,
) -> AppResult<(StatusCode, ApiResponse<product::Model>)> {
    let product = state.product_service.publish(&user, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(product)))
}

async fn public_products(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<PublicProducts>> {
    let products = state.product_service.public_products().await?;
    Ok(ApiResponse::ok(products))
}

async fn my_products(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<MyProducts>> {
    let products = state
        .product_service
        .my_products(&user.id, query.page, query.limit)
        .await?;
    Ok(ApiResponse::ok(products))
}

/// Live products are visible to anyone; others only to their owner and admins.
async fn show(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<product::Model>> {
    let product = state
        .product_service
        .get_product(&id, viewer.as_ref())
        .await?;
    Ok(ApiResponse::ok(product))
}

async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Deleted>> {
    state.product_service.delete(&id, &user.id).await?;
    Ok(deleted())
}

/// Report a live product. No account required.
async fn report_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ReportProductInput>,
) -> AppResult<(StatusCode, ApiResponse<report::Model>)> {
    let report = state.product_service.report_product(&id, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(report)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/publish", post(publish))
        .route("/public", get(public_products))
        .route("/my-products", get(my_products))
        .route("/{id}", get(show).delete(delete))
        .route("/{id}/report", post(report_product))
}
