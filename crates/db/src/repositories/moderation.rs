//! Moderation repository for cross-entity cascades.
//!
//! Each method runs its state change and the dependent bulk updates in one
//! transaction, so readers never observe a suspended user with approved
//! products, or a resolved report whose deactivation was not applied.
//! Every write is conditional on the state it was checked against, so a
//! concurrent transition makes the loser fail instead of overwriting.

use std::sync::Arc;

use crate::entities::{
    Product, Report, User,
    product::{self, ProductStatus},
    report::{self, ReportStatus},
    user::{self, UserStatus},
};
use crate::repositories::ProductRepository;
use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveEnum, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait, Value,
    sea_query::Expr,
};
use upcycle_common::{AppError, AppResult};

/// Moderation repository for database operations.
#[derive(Clone)]
pub struct ModerationRepository {
    db: Arc<DatabaseConnection>,
}

impl ModerationRepository {
    /// Create a new moderation repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Suspend an active user and deactivate all of their approved products.
    ///
    /// Returns the updated user and the number of products deactivated.
    pub async fn suspend_user(
        &self,
        user_id: &str,
        reason: &str,
        admin_id: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<(user::Model, u64)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = User::update_many()
            .col_expr(user::Column::Status, Expr::value(UserStatus::Suspended))
            .col_expr(user::Column::SuspensionReason, Expr::value(reason))
            .col_expr(user::Column::SuspendedAt, Expr::value(now))
            .col_expr(user::Column::SuspendedBy, Expr::value(admin_id))
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::Status.eq(UserStatus::Active))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(AppError::precondition(
                "User is not active",
                UserStatus::Active.to_value(),
                UserStatus::Suspended.to_value(),
            ));
        }

        let cascade_reason = format!("User suspended: {reason}");
        let deactivated = ProductRepository::deactivate_approved_for_user(
            &txn,
            user_id,
            &cascade_reason,
            admin_id,
            now,
        )
        .await?;

        let user = User::find_by_id(user_id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((user, deactivated))
    }

    /// Reactivate a suspended user, optionally restoring the products their
    /// suspension deactivated.
    ///
    /// Returns the updated user and the number of products restored.
    pub async fn reactivate_user(
        &self,
        user_id: &str,
        restore_products: bool,
        now: DateTime<FixedOffset>,
    ) -> AppResult<(user::Model, u64)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = User::update_many()
            .col_expr(user::Column::Status, Expr::value(UserStatus::Active))
            .col_expr(user::Column::SuspensionReason, Expr::value(Value::String(None)))
            .col_expr(
                user::Column::SuspendedAt,
                Expr::value(Value::ChronoDateTimeWithTimeZone(None)),
            )
            .col_expr(user::Column::SuspendedBy, Expr::value(Value::String(None)))
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::Status.eq(UserStatus::Suspended))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(AppError::precondition(
                "User is not suspended",
                UserStatus::Suspended.to_value(),
                UserStatus::Active.to_value(),
            ));
        }

        let restored = if restore_products {
            ProductRepository::restore_suspended_for_user(&txn, user_id, now).await?
        } else {
            0
        };

        let user = User::find_by_id(user_id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((user, restored))
    }

    /// Approve a pending product and verify its owner on first approval.
    ///
    /// `approval` carries the columns to set. The owner's row is locked with a
    /// conditional write first, so a concurrent suspension either waits for
    /// this approval (and then deactivates the product) or makes it fail.
    /// Returns the approved product and whether the owner was newly verified.
    pub async fn approve_product(
        &self,
        product_id: &str,
        owner_id: &str,
        approval: product::ActiveModel,
        admin_id: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<(product::Model, bool)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let owner = User::update_many()
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(owner_id))
            .filter(user::Column::Status.eq(UserStatus::Active))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if owner.rows_affected == 0 {
            let status = User::find_by_id(owner_id)
                .one(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .map(|u| u.status);
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(match status {
                Some(status) => AppError::precondition(
                    "Cannot approve a product while its owner is suspended",
                    UserStatus::Active.to_value(),
                    status.to_value(),
                ),
                None => AppError::UserNotFound(owner_id.to_string()),
            });
        }

        let result = Product::update_many()
            .set(approval)
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Status.eq(ProductStatus::PendingVerification))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            let current = Product::find_by_id(product_id)
                .one(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(match current {
                Some(product) => AppError::precondition(
                    "Only products pending verification can be approved",
                    ProductStatus::PendingVerification.to_value(),
                    product.status.to_value(),
                ),
                None => AppError::ProductNotFound(product_id.to_string()),
            });
        }

        let verified = User::update_many()
            .col_expr(user::Column::IsVerified, Expr::value(true))
            .col_expr(user::Column::VerifiedAt, Expr::value(now))
            .col_expr(user::Column::VerifiedBy, Expr::value(admin_id))
            .filter(user::Column::Id.eq(owner_id))
            .filter(user::Column::IsVerified.eq(false))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::ProductNotFound(product_id.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((product, verified.rows_affected == 1))
    }

    /// Resolve a pending report together with the deactivation of the
    /// reported product, if any.
    ///
    /// Only one resolution of a report can succeed; a second one gets a
    /// `Precondition`. The deactivation applies only while the product is
    /// still approved, otherwise it is skipped and `None` is returned.
    pub async fn resolve_report(
        &self,
        report_id: &str,
        resolution: report::ActiveModel,
        deactivation: Option<product::ActiveModel>,
    ) -> AppResult<(report::Model, Option<product::Model>)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = Report::update_many()
            .set(resolution)
            .filter(report::Column::Id.eq(report_id))
            .filter(report::Column::Status.eq(ReportStatus::Pending))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            let exists = Report::find_by_id(report_id)
                .one(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .is_some();
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(if exists {
                AppError::precondition(
                    "Report is already resolved",
                    ReportStatus::Pending.to_value(),
                    ReportStatus::Resolved.to_value(),
                )
            } else {
                AppError::ReportNotFound(report_id.to_string())
            });
        }

        let report = Report::find_by_id(report_id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::ReportNotFound(report_id.to_string()))?;

        let product = match deactivation {
            Some(model) => {
                let result = Product::update_many()
                    .set(model)
                    .filter(product::Column::Id.eq(report.product_id.as_str()))
                    .filter(product::Column::Status.eq(ProductStatus::Approved))
                    .exec(&txn)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                if result.rows_affected == 0 {
                    None
                } else {
                    Product::find_by_id(report.product_id.clone())
                        .one(&txn)
                        .await
                        .map_err(|e| AppError::Database(e.to_string()))?
                }
            }
            None => None,
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((report, product))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::repositories::UserRepository;
    use crate::test_utils::TestDatabase;
    use chrono::Utc;
    use sea_orm::Set;

    #[tokio::test]
    async fn test_suspend_and_reactivate_user() {
        let db = TestDatabase::new().await.unwrap();
        db.create_user("u1").await.unwrap();
        let repo = ModerationRepository::new(db.connection());
        let now = Utc::now().fixed_offset();

        let (user, deactivated) = repo.suspend_user("u1", "fraud", "a1", now).await.unwrap();
        assert_eq!(user.status, UserStatus::Suspended);
        assert_eq!(user.suspension_reason.as_deref(), Some("fraud"));
        assert_eq!(deactivated, 0);

        let (user, restored) = repo.reactivate_user("u1", true, now).await.unwrap();
        assert_eq!(user.status, UserStatus::Active);
        assert!(user.suspension_reason.is_none());
        assert!(user.suspended_at.is_none());
        assert_eq!(restored, 0);
    }

    #[tokio::test]
    async fn test_suspend_twice_is_precondition() {
        let db = TestDatabase::new().await.unwrap();
        db.create_user("u1").await.unwrap();
        let repo = ModerationRepository::new(db.connection());
        let now = Utc::now().fixed_offset();

        repo.suspend_user("u1", "fraud", "a1", now).await.unwrap();
        let second = repo.suspend_user("u1", "again", "a1", now).await;
        assert!(matches!(second, Err(AppError::Precondition { .. })));

        // The first reason is kept
        let user = UserRepository::new(db.connection())
            .get_by_id("u1")
            .await
            .unwrap();
        assert_eq!(user.suspension_reason.as_deref(), Some("fraud"));
    }

    fn approval(now: DateTime<FixedOffset>) -> product::ActiveModel {
        product::ActiveModel {
            status: Set(ProductStatus::Approved),
            is_public: Set(true),
            published_at: Set(Some(now)),
            reviewed_by: Set(Some("a1".to_string())),
            reviewed_at: Set(Some(now)),
            ..Default::default()
        }
    }

    fn deactivation() -> product::ActiveModel {
        product::ActiveModel {
            status: Set(ProductStatus::Deactivated),
            previous_status: Set(Some(ProductStatus::Approved)),
            is_public: Set(false),
            ..Default::default()
        }
    }

    async fn seeded() -> (TestDatabase, ModerationRepository) {
        let db = TestDatabase::new().await.unwrap();
        db.create_user("u1").await.unwrap();
        db.create_completed_submission("s1", "u1", 2, "Panel")
            .await
            .unwrap();
        db.create_pending_product("p1", "u1", "s1", 0).await.unwrap();
        let repo = ModerationRepository::new(db.connection());
        (db, repo)
    }

    #[tokio::test]
    async fn test_approve_product_verifies_owner_once() {
        let (db, repo) = seeded().await;
        let now = Utc::now().fixed_offset();

        let (product, verified) = repo
            .approve_product("p1", "u1", approval(now), "a1", now)
            .await
            .unwrap();
        assert_eq!(product.status, ProductStatus::Approved);
        assert!(product.is_public);
        assert!(verified);

        // Already approved: the status guard refuses a second approval
        let again = repo.approve_product("p1", "u1", approval(now), "a1", now).await;
        assert!(matches!(again, Err(AppError::Precondition { .. })));

        let owner = UserRepository::new(db.connection())
            .get_by_id("u1")
            .await
            .unwrap();
        assert!(owner.is_verified);
    }

    #[tokio::test]
    async fn test_approve_product_of_suspended_owner_is_refused() {
        let (db, repo) = seeded().await;
        let now = Utc::now().fixed_offset();
        repo.suspend_user("u1", "fraud", "a1", now).await.unwrap();

        let result = repo.approve_product("p1", "u1", approval(now), "a1", now).await;
        match result {
            Err(AppError::Precondition { required, actual, .. }) => {
                assert_eq!(required, "active");
                assert_eq!(actual, "suspended");
            }
            other => panic!("expected precondition, got {other:?}"),
        }

        // Nothing was written
        let product = ProductRepository::new(db.connection())
            .get_by_id("p1")
            .await
            .unwrap();
        assert_eq!(product.status, ProductStatus::PendingVerification);
        let owner = UserRepository::new(db.connection())
            .get_by_id("u1")
            .await
            .unwrap();
        assert!(!owner.is_verified);
    }

    #[tokio::test]
    async fn test_report_resolves_only_once() {
        let (db, repo) = seeded().await;
        let now = Utc::now().fixed_offset();
        repo.approve_product("p1", "u1", approval(now), "a1", now)
            .await
            .unwrap();
        db.create_report("r1", "p1").await.unwrap();

        let resolution = || report::ActiveModel {
            status: Set(ReportStatus::Resolved),
            resolved_by: Set(Some("a1".to_string())),
            resolved_at: Set(Some(now)),
            ..Default::default()
        };

        let (report, product) = repo
            .resolve_report("r1", resolution(), Some(deactivation()))
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::Resolved);
        assert_eq!(product.unwrap().status, ProductStatus::Deactivated);

        let second = repo
            .resolve_report("r1", resolution(), Some(deactivation()))
            .await;
        assert!(matches!(second, Err(AppError::Precondition { .. })));

        let missing = repo.resolve_report("nope", resolution(), None).await;
        assert!(matches!(missing, Err(AppError::ReportNotFound(_))));
    }

    #[tokio::test]
    async fn test_report_cascade_skips_product_no_longer_approved() {
        let (db, repo) = seeded().await;
        db.create_report("r1", "p1").await.unwrap();

        let resolution = report::ActiveModel {
            status: Set(ReportStatus::Resolved),
            ..Default::default()
        };
        let (report, product) = repo
            .resolve_report("r1", resolution, Some(deactivation()))
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Resolved);
        assert!(product.is_none());
        let stored = ProductRepository::new(db.connection())
            .get_by_id("p1")
            .await
            .unwrap();
        assert_eq!(stored.status, ProductStatus::PendingVerification);
    }

    #[tokio::test]
    async fn test_reactivate_active_user_is_precondition() {
        let db = TestDatabase::new().await.unwrap();
        db.create_user("u1").await.unwrap();
        let repo = ModerationRepository::new(db.connection());

        let result = repo
            .reactivate_user("u1", true, Utc::now().fixed_offset())
            .await;
        assert!(matches!(result, Err(AppError::Precondition { .. })));
    }
}
