//! Product repository.

use std::sync::Arc;

use crate::entities::{
    Idea, Product, idea,
    product::{self, DeactivationType, ProductStatus},
};
use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, Value,
    sea_query::{Expr, Func},
};
use upcycle_common::{AppError, AppResult};

/// Filter for the admin product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Only products in this status.
    pub status: Option<ProductStatus>,
    /// Case-insensitive substring of the material.
    pub material: Option<String>,
    /// Case-insensitive substring of the industry.
    pub industry: Option<String>,
}

/// Product repository for database operations.
#[derive(Clone)]
pub struct ProductRepository {
    db: Arc<DatabaseConnection>,
}

impl ProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a product by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<product::Model>> {
        Product::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a product by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<product::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ProductNotFound(id.to_string()))
    }

    /// Update a product.
    pub async fn update(&self, model: product::ActiveModel) -> AppResult<product::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The user's product awaiting review, if any.
    pub async fn find_pending_for_user(
        &self,
        user_id: &str,
    ) -> AppResult<Option<product::Model>> {
        Product::find()
            .filter(product::Column::UserId.eq(user_id))
            .filter(product::Column::Status.eq(ProductStatus::PendingVerification))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a product and mark its idea slot as published, atomically.
    ///
    /// Fails with [`AppError::Conflict`] if the slot was published in the
    /// meantime or the user already has a pending product.
    pub async fn publish(
        &self,
        model: product::ActiveModel,
        idea_id: &str,
    ) -> AppResult<product::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let product = model.insert(&txn).await.map_err(AppError::from)?;

        let result = Idea::update_many()
            .col_expr(idea::Column::IsPublished, Expr::value(true))
            .col_expr(idea::Column::PublishedProductId, Expr::value(product.id.clone()))
            .filter(idea::Column::Id.eq(idea_id))
            .filter(idea::Column::IsPublished.eq(false))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(AppError::conflict("Idea is already published", None));
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(product)
    }

    /// Delete a product and free its idea slot, atomically.
    pub async fn delete_and_unpublish(&self, product: &product::Model) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Product::delete_by_id(product.id.clone())
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Idea::update_many()
            .col_expr(idea::Column::IsPublished, Expr::value(false))
            .col_expr(
                idea::Column::PublishedProductId,
                Expr::value(Value::String(None)),
            )
            .filter(idea::Column::SubmissionId.eq(product.submission_id.as_str()))
            .filter(idea::Column::IdeaIndex.eq(product.idea_index))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Products of a user, newest first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<product::Model>> {
        Product::find()
            .filter(product::Column::UserId.eq(user_id))
            .order_by_desc(product::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count a user's products, optionally restricted to one status.
    pub async fn count_for_user(
        &self,
        user_id: &str,
        status: Option<ProductStatus>,
    ) -> AppResult<u64> {
        let mut query = Product::find().filter(product::Column::UserId.eq(user_id));

        if let Some(s) = status {
            query = query.filter(product::Column::Status.eq(s));
        }

        query
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Approved and public products, most recently published first.
    pub async fn list_public(&self) -> AppResult<Vec<product::Model>> {
        Product::find()
            .filter(product::Column::Status.eq(ProductStatus::Approved))
            .filter(product::Column::IsPublic.eq(true))
            .order_by_desc(product::Column::PublishedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Products awaiting review, oldest first.
    pub async fn list_pending(&self) -> AppResult<Vec<product::Model>> {
        Product::find()
            .filter(product::Column::Status.eq(ProductStatus::PendingVerification))
            .order_by_asc(product::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All products matching a filter, newest first.
    pub async fn list_filtered(
        &self,
        filter: &ProductFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<product::Model>> {
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);

        if let Some(s) = filter.status {
            query = query.filter(product::Column::Status.eq(s));
        }
        if let Some(material) = &filter.material {
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(product::Column::Material)))
                    .like(format!("%{}%", material.to_lowercase())),
            );
        }
        if let Some(industry) = &filter.industry {
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(product::Column::Industry)))
                    .like(format!("%{}%", industry.to_lowercase())),
            );
        }

        query
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Deactivated products, optionally of one deactivation type, most recent first.
    pub async fn list_deactivated(
        &self,
        deactivation_type: Option<DeactivationType>,
    ) -> AppResult<Vec<product::Model>> {
        let mut query = Product::find()
            .filter(product::Column::Status.eq(ProductStatus::Deactivated))
            .order_by_desc(product::Column::DeactivatedAt);

        if let Some(t) = deactivation_type {
            query = query.filter(product::Column::DeactivationType.eq(t));
        }

        query
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All approved products (public or not).
    pub async fn list_approved(&self) -> AppResult<Vec<product::Model>> {
        Product::find()
            .filter(product::Column::Status.eq(ProductStatus::Approved))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count products in one status.
    pub async fn count_by_status(&self, status: ProductStatus) -> AppResult<u64> {
        Product::find()
            .filter(product::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find products by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<product::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Product::find()
            .filter(product::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Increment the view counter.
    pub async fn increment_view_count(&self, id: &str) -> AppResult<()> {
        Product::update_many()
            .col_expr(
                product::Column::ViewCount,
                Expr::col(product::Column::ViewCount).add(1),
            )
            .filter(product::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Increment the report counter.
    pub async fn increment_report_count<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        Product::update_many()
            .col_expr(
                product::Column::ReportCount,
                Expr::col(product::Column::ReportCount).add(1),
            )
            .filter(product::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    // ========== Suspension cascade ==========

    /// Deactivate every approved product of a user, tagging each as a
    /// suspension deactivation. Returns the number of products affected.
    pub async fn deactivate_approved_for_user<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        reason: &str,
        deactivated_by: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<u64> {
        let result = Product::update_many()
            .col_expr(
                product::Column::Status,
                Expr::value(ProductStatus::Deactivated),
            )
            .col_expr(
                product::Column::PreviousStatus,
                Expr::value(ProductStatus::Approved),
            )
            .col_expr(
                product::Column::DeactivationType,
                Expr::value(DeactivationType::UserSuspension),
            )
            .col_expr(product::Column::DeactivationReason, Expr::value(reason))
            .col_expr(product::Column::DeactivatedBy, Expr::value(deactivated_by))
            .col_expr(product::Column::DeactivatedAt, Expr::value(now))
            .col_expr(product::Column::IsPublic, Expr::value(false))
            .col_expr(product::Column::UpdatedAt, Expr::value(now))
            .filter(product::Column::UserId.eq(user_id))
            .filter(product::Column::Status.eq(ProductStatus::Approved))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Restore the products a suspension deactivated. Products deactivated for
    /// any other reason are left alone. Returns the number restored.
    pub async fn restore_suspended_for_user<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<u64> {
        let result = Product::update_many()
            .col_expr(product::Column::Status, Expr::value(ProductStatus::Approved))
            .col_expr(product::Column::PreviousStatus, Expr::value(Value::String(None)))
            .col_expr(
                product::Column::DeactivationType,
                Expr::value(Value::String(None)),
            )
            .col_expr(
                product::Column::DeactivationReason,
                Expr::value(Value::String(None)),
            )
            .col_expr(product::Column::DeactivatedBy, Expr::value(Value::String(None)))
            .col_expr(
                product::Column::DeactivatedAt,
                Expr::value(Value::ChronoDateTimeWithTimeZone(None)),
            )
            .col_expr(product::Column::IsPublic, Expr::value(true))
            .col_expr(product::Column::UpdatedAt, Expr::value(now))
            .filter(product::Column::UserId.eq(user_id))
            .filter(product::Column::Status.eq(ProductStatus::Deactivated))
            .filter(product::Column::DeactivationType.eq(DeactivationType::UserSuspension))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
