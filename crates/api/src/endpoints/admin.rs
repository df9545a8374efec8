//! Admin/Moderation endpoints.
//!
//! Every route requires an administrator.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use upcycle_common::AppResult;
use upcycle_core::{
    ApprovalOutcome, DashboardStats, DeactivateProductInput, ReportView, ResolveOutcome,
    ResolveReportInput, UserModerationOutcome,
};
use upcycle_db::{
    entities::{
        product::{self, DeactivationType, ProductStatus},
        report::ReportStatus,
        user,
    },
    repositories::ProductFilter,
};

use crate::{
    extractors::AdminUser,
    middleware::AppState,
    response::{ApiResponse, PageQuery},
};

// ==================== Request Types ====================

/// Product listing query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
    #[serde(default)]
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default)]
    pub limit: u64,
}

const fn default_page() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivatedQuery {
    #[serde(default, rename = "type")]
    pub deactivation_type: Option<DeactivationType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReportsQuery {
    #[serde(default)]
    pub status: Option<ReportStatus>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub reason: String,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivateProductRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendUserRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivateUserRequest {
    #[serde(default = "default_true")]
    pub reactivate_products: bool,
}

impl Default for ReactivateUserRequest {
    fn default() -> Self {
        Self {
            reactivate_products: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

// ==================== Dashboard ====================

async fn dashboard_stats(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<DashboardStats>> {
    let stats = state.moderation_service.dashboard_stats().await?;
    Ok(ApiResponse::ok(stats))
}

// ==================== Products ====================

async fn list_products(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> AppResult<ApiResponse<Vec<product::Model>>> {
    let filter = ProductFilter {
        status: query.status,
        material: query.material.filter(|m| !m.trim().is_empty()),
        industry: query.industry.filter(|i| !i.trim().is_empty()),
    };
    let products = state
        .moderation_service
        .list_products(&filter, query.page, query.limit)
        .await?;
    Ok(ApiResponse::ok(products))
}

async fn pending_products(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<product::Model>>> {
    let products = state.moderation_service.pending_products().await?;
    Ok(ApiResponse::ok(products))
}

async fn deactivated_products(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<DeactivatedQuery>,
) -> AppResult<ApiResponse<Vec<product::Model>>> {
    let products = state
        .moderation_service
        .deactivated_products(query.deactivation_type)
        .await?;
    Ok(ApiResponse::ok(products))
}

async fn show_product(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<product::Model>> {
    let product = state.moderation_service.get_product(&id).await?;
    Ok(ApiResponse::ok(product))
}

async fn approve_product(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ApproveRequest>>,
) -> AppResult<ApiResponse<ApprovalOutcome>> {
    let Json(req) = body.unwrap_or_default();
    let outcome = state
        .moderation_service
        .approve_product(&id, &admin.id, req.admin_notes)
        .await?;
    Ok(ApiResponse::ok(outcome))
}

async fn reject_product(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> AppResult<ApiResponse<product::Model>> {
    let product = state
        .moderation_service
        .reject_product(&id, &admin.id, &req.reason, req.admin_notes)
        .await?;
    Ok(ApiResponse::ok(product))
}

async fn deactivate_product(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<DeactivateProductInput>,
) -> AppResult<ApiResponse<product::Model>> {
    let product = state
        .moderation_service
        .deactivate_product(&id, &admin.id, input)
        .await?;
    Ok(ApiResponse::ok(product))
}

async fn reactivate_product(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReactivateProductRequest>>,
) -> AppResult<ApiResponse<product::Model>> {
    let Json(req) = body.unwrap_or_default();
    let product = state
        .moderation_service
        .reactivate_product(&id, &admin.id, req.notes)
        .await?;
    Ok(ApiResponse::ok(product))
}

// ==================== Users ====================

async fn list_users(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<Vec<user::Model>>> {
    let users = state
        .moderation_service
        .list_users(query.page, query.limit)
        .await?;
    Ok(ApiResponse::ok(users))
}

async fn suspend_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SuspendUserRequest>,
) -> AppResult<ApiResponse<UserModerationOutcome>> {
    let outcome = state
        .moderation_service
        .suspend_user(&id, &admin.id, &req.reason)
        .await?;
    Ok(ApiResponse::ok(outcome))
}

async fn reactivate_user(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReactivateUserRequest>>,
) -> AppResult<ApiResponse<UserModerationOutcome>> {
    let Json(req) = body.unwrap_or_default();
    let outcome = state
        .moderation_service
        .reactivate_user(&id, req.reactivate_products)
        .await?;
    Ok(ApiResponse::ok(outcome))
}

// ==================== Reports ====================

async fn list_reports(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ListReportsQuery>,
) -> AppResult<ApiResponse<Vec<ReportView>>> {
    let reports = state
        .moderation_service
        .list_reports(query.status, query.page, query.limit)
        .await?;
    Ok(ApiResponse::ok(reports))
}

async fn pending_reports(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<Vec<ReportView>>> {
    let reports = state
        .moderation_service
        .list_reports(Some(ReportStatus::Pending), query.page, query.limit)
        .await?;
    Ok(ApiResponse::ok(reports))
}

async fn resolve_report(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ResolveReportInput>,
) -> AppResult<ApiResponse<ResolveOutcome>> {
    let outcome = state
        .moderation_service
        .resolve_report(&id, &admin.id, input)
        .await?;
    Ok(ApiResponse::ok(outcome))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(dashboard_stats))
        // Products
        .route("/products", get(list_products))
        .route("/products/pending", get(pending_products))
        .route("/products/deactivated", get(deactivated_products))
        .route("/products/{id}", get(show_product))
        .route("/products/{id}/approve", post(approve_product))
        .route("/products/{id}/reject", post(reject_product))
        .route("/products/{id}/deactivate", post(deactivate_product))
        .route("/products/{id}/reactivate", post(reactivate_product))
        // Users
        .route("/users", get(list_users))
        .route("/users/{id}/suspend", post(suspend_user))
        .route("/users/{id}/reactivate", post(reactivate_user))
        // Reports
        .route("/reports", get(list_reports))
        .route("/reports/pending", get(pending_reports))
        .route("/reports/{id}/resolve", post(resolve_report))
}
