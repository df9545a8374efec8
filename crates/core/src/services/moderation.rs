//! Moderation service: admin transitions on products, users and reports.
//!
//! Product transitions go through [`crate::services::lifecycle`]. User
//! suspension and report resolution cascade onto products inside one
//! repository transaction.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{ActiveEnum, ActiveValue::Set};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use upcycle_common::{AppError, AppResult};
use upcycle_db::{
    entities::{
        product::{self, DeactivationType, ProductStatus},
        report::{self, ReportStatus, ResolutionAction},
        user,
    },
    repositories::{
        ModerationRepository, ProductFilter, ProductRepository, ReportRepository, UserRepository,
    },
};

use crate::services::lifecycle;
use crate::services::notification::{NotificationEvent, Notifier, Recipient};
use crate::services::page_bounds;
use crate::services::report_digest::{DELETED_PRODUCT_NAME, product_names};

/// Input for deactivating a product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateProductInput {
    pub reason: String,
    /// `admin_action` (default) or `policy_violation`.
    #[serde(default)]
    pub deactivation_type: Option<DeactivationType>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

/// Input for resolving a report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReportInput {
    pub action: ResolutionAction,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

/// Result of an approval.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub product: product::Model,
    /// The approval granted the owner's verification.
    pub owner_verified: bool,
}

/// Result of a user suspension or reactivation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserModerationOutcome {
    pub user: user::Model,
    /// Products deactivated (suspension) or restored (reactivation).
    pub affected_products: u64,
}

/// Result of a report resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutcome {
    pub report: report::Model,
    /// The product the resolution deactivated, if any.
    pub deactivated_product: Option<product::Model>,
}

/// A report with the name of the product it points at.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    #[serde(flatten)]
    pub report: report::Model,
    pub product_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total: u64,
    pub verified: u64,
    pub suspended: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductStats {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub deactivated: u64,
}

/// Impact of the approved catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactSummary {
    pub total_co2_saved: i64,
    pub total_water_saved: i64,
    pub avg_profit_margin: i64,
    pub avg_feasibility_score: i64,
}

/// Admin dashboard figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub users: UserStats,
    pub products: ProductStats,
    pub pending_reports: u64,
    pub impact: ImpactSummary,
}

/// Moderation service.
#[derive(Clone)]
pub struct ModerationService {
    moderation_repo: ModerationRepository,
    product_repo: ProductRepository,
    user_repo: UserRepository,
    report_repo: ReportRepository,
    notifier: Notifier,
}

impl ModerationService {
    /// Create a new moderation service.
    #[must_use]
    pub const fn new(
        moderation_repo: ModerationRepository,
        product_repo: ProductRepository,
        user_repo: UserRepository,
        report_repo: ReportRepository,
        notifier: Notifier,
    ) -> Self {
        Self {
            moderation_repo,
            product_repo,
            user_repo,
            report_repo,
            notifier,
        }
    }

    // ========== Product Transitions ==========

    /// Approve a pending product. The first approval verifies its owner.
    pub async fn approve_product(
        &self,
        product_id: &str,
        admin_id: &str,
        admin_notes: Option<String>,
    ) -> AppResult<ApprovalOutcome> {
        let product = self.product_repo.get_by_id(product_id).await?;
        let owner_id = product.user_id.clone();

        let now = now();
        let approval = lifecycle::approve(product, admin_id, admin_notes, now)?;
        // Re-checks the owner and the pending status under the same transaction
        let (product, owner_verified) = self
            .moderation_repo
            .approve_product(product_id, &owner_id, approval, admin_id, now)
            .await?;
        let owner = self.user_repo.get_by_id(&owner_id).await?;

        info!(product_id = %product.id, admin_id = %admin_id, owner_verified, "Product approved");

        self.notifier
            .notify(NotificationEvent::ProductApproved {
                owner: Recipient::from(&owner),
                product_name: product.name.clone(),
                newly_verified: owner_verified,
            })
            .await;

        Ok(ApprovalOutcome {
            product,
            owner_verified,
        })
    }

    /// Reject a pending product. Terminal.
    pub async fn reject_product(
        &self,
        product_id: &str,
        admin_id: &str,
        reason: &str,
        admin_notes: Option<String>,
    ) -> AppResult<product::Model> {
        let product = self.product_repo.get_by_id(product_id).await?;
        let active = lifecycle::reject(product, admin_id, reason, admin_notes, now())?;
        let product = self.product_repo.update(active).await?;

        info!(product_id = %product.id, admin_id = %admin_id, "Product rejected");

        if let Some(owner) = self.user_repo.find_by_id(&product.user_id).await? {
            self.notifier
                .notify(NotificationEvent::ProductRejected {
                    owner: Recipient::from(&owner),
                    product_name: product.name.clone(),
                    reason: product.rejection_reason.clone().unwrap_or_default(),
                })
                .await;
        }

        Ok(product)
    }

    /// Take an approved product off the public surface.
    pub async fn deactivate_product(
        &self,
        product_id: &str,
        admin_id: &str,
        input: DeactivateProductInput,
    ) -> AppResult<product::Model> {
        let deactivation_type = input
            .deactivation_type
            .unwrap_or(DeactivationType::AdminAction);
        if !matches!(
            deactivation_type,
            DeactivationType::AdminAction | DeactivationType::PolicyViolation
        ) {
            return Err(AppError::Validation(
                "Deactivation type must be admin_action or policy_violation".to_string(),
            ));
        }

        let product = self.product_repo.get_by_id(product_id).await?;
        let active = lifecycle::deactivate(
            product,
            deactivation_type,
            &input.reason,
            admin_id,
            input.admin_notes,
            now(),
        )?;
        let product = self.product_repo.update(active).await?;

        info!(
            product_id = %product.id,
            admin_id = %admin_id,
            deactivation_type = ?deactivation_type,
            "Product deactivated"
        );

        if let Some(owner) = self.user_repo.find_by_id(&product.user_id).await? {
            self.notifier
                .notify(NotificationEvent::ProductDeactivated {
                    owner: Recipient::from(&owner),
                    product_name: product.name.clone(),
                    reason: product.deactivation_reason.clone().unwrap_or_default(),
                })
                .await;
        }

        Ok(product)
    }

    /// Restore a deactivated product. Blocked while its owner is suspended.
    pub async fn reactivate_product(
        &self,
        product_id: &str,
        admin_id: &str,
        notes: Option<String>,
    ) -> AppResult<product::Model> {
        let product = self.product_repo.get_by_id(product_id).await?;
        let owner = self.user_repo.get_by_id(&product.user_id).await?;

        let active = lifecycle::reactivate(product, &owner, notes, now())?;
        let product = self.product_repo.update(active).await?;

        info!(product_id = %product.id, admin_id = %admin_id, "Product reactivated");

        self.notifier
            .notify(NotificationEvent::ProductReactivated {
                owner: Recipient::from(&owner),
                product_name: product.name.clone(),
            })
            .await;

        Ok(product)
    }

    // ========== User Cascades ==========

    /// Suspend a user and deactivate every product they have live.
    pub async fn suspend_user(
        &self,
        user_id: &str,
        admin_id: &str,
        reason: &str,
    ) -> AppResult<UserModerationOutcome> {
        let reason = lifecycle::required_text(reason, "Suspension reason")?;
        let target = self.user_repo.get_by_id(user_id).await?;

        if target.is_admin() {
            return Err(AppError::Forbidden(
                "Admin accounts cannot be suspended".to_string(),
            ));
        }

        let (user, deactivated) = self
            .moderation_repo
            .suspend_user(user_id, &reason, admin_id, now())
            .await?;

        info!(user_id = %user_id, admin_id = %admin_id, deactivated, "User suspended");

        self.notifier
            .notify(NotificationEvent::UserSuspended {
                user: Recipient::from(&user),
                reason,
            })
            .await;

        Ok(UserModerationOutcome {
            user,
            affected_products: deactivated,
        })
    }

    /// Reactivate a suspended user. With `reactivate_products`, products the
    /// suspension took down are restored; other deactivations stay.
    pub async fn reactivate_user(
        &self,
        user_id: &str,
        reactivate_products: bool,
    ) -> AppResult<UserModerationOutcome> {
        let (user, restored) = self
            .moderation_repo
            .reactivate_user(user_id, reactivate_products, now())
            .await?;

        info!(user_id = %user_id, restored, "User reactivated");

        self.notifier
            .notify(NotificationEvent::UserReactivated {
                user: Recipient::from(&user),
                reactivated_products: restored,
            })
            .await;

        Ok(UserModerationOutcome {
            user,
            affected_products: restored,
        })
    }

    // ========== Reports ==========

    /// Resolve a pending report, optionally deactivating the reported product.
    ///
    /// A report whose product is gone, or no longer approved, is resolved
    /// without a cascade.
    pub async fn resolve_report(
        &self,
        report_id: &str,
        admin_id: &str,
        input: ResolveReportInput,
    ) -> AppResult<ResolveOutcome> {
        let report = self.report_repo.get_by_id(report_id).await?;
        if report.status != ReportStatus::Pending {
            return Err(AppError::precondition(
                "Report is already resolved",
                ReportStatus::Pending.to_value(),
                report.status.to_value(),
            ));
        }

        let now = now();
        let report_reason = match &report.details {
            Some(details) => format!("{}: {details}", report.reason.to_value()),
            None => report.reason.to_value(),
        };

        let deactivation = if input.action == ResolutionAction::Deactivate {
            match self.product_repo.find_by_id(&report.product_id).await? {
                Some(product) if product.status == ProductStatus::Approved => {
                    Some(lifecycle::deactivate(
                        product,
                        DeactivationType::PolicyViolation,
                        &format!("Report resolved: {report_reason}"),
                        admin_id,
                        None,
                        now,
                    )?)
                }
                Some(product) => {
                    info!(
                        report_id = %report_id,
                        product_id = %product.id,
                        status = ?product.status,
                        "Reported product is not approved, nothing to deactivate"
                    );
                    None
                }
                None => {
                    warn!(
                        report_id = %report_id,
                        product_id = %report.product_id,
                        "Reported product no longer exists, resolving without cascade"
                    );
                    None
                }
            }
        } else {
            None
        };

        let report_id = report.id.clone();
        let mut active: report::ActiveModel = report.into();
        active.status = Set(ReportStatus::Resolved);
        active.resolution_action = Set(Some(input.action));
        active.resolved_by = Set(Some(admin_id.to_string()));
        active.resolved_at = Set(Some(now));
        active.admin_notes = Set(input
            .admin_notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()));

        let (report, deactivated_product) = self
            .moderation_repo
            .resolve_report(&report_id, active, deactivation)
            .await?;

        info!(
            report_id = %report.id,
            admin_id = %admin_id,
            action = ?input.action,
            deactivated = deactivated_product.is_some(),
            "Report resolved"
        );

        if let Some(product) = &deactivated_product {
            if let Some(owner) = self.user_repo.find_by_id(&product.user_id).await? {
                self.notifier
                    .notify(NotificationEvent::ProductDeactivatedByReport {
                        owner: Recipient::from(&owner),
                        product_name: product.name.clone(),
                        report_reason,
                    })
                    .await;
            }
        }

        Ok(ResolveOutcome {
            report,
            deactivated_product,
        })
    }

    // ========== Admin Reads ==========

    /// Dashboard figures. Users count only non-admin accounts.
    pub async fn dashboard_stats(&self) -> AppResult<DashboardStats> {
        let users = UserStats {
            total: self.user_repo.count_users().await?,
            verified: self.user_repo.count_verified().await?,
            suspended: self.user_repo.count_suspended().await?,
        };

        let products = ProductStats {
            pending: self
                .product_repo
                .count_by_status(ProductStatus::PendingVerification)
                .await?,
            approved: self.product_repo.count_by_status(ProductStatus::Approved).await?,
            rejected: self.product_repo.count_by_status(ProductStatus::Rejected).await?,
            deactivated: self
                .product_repo
                .count_by_status(ProductStatus::Deactivated)
                .await?,
        };

        let approved = self.product_repo.list_approved().await?;
        let impact = if approved.is_empty() {
            ImpactSummary::default()
        } else {
            let n = approved.len() as f64;
            let profit: i64 = approved.iter().map(|p| i64::from(p.profit_margin)).sum();
            let feasibility: i64 = approved.iter().map(|p| i64::from(p.feasibility_score)).sum();
            ImpactSummary {
                total_co2_saved: approved.iter().map(|p| p.co2_saved).sum(),
                total_water_saved: approved.iter().map(|p| p.water_saved).sum(),
                avg_profit_margin: (profit as f64 / n).round() as i64,
                avg_feasibility_score: (feasibility as f64 / n).round() as i64,
            }
        };

        Ok(DashboardStats {
            users,
            products,
            pending_reports: self.report_repo.count_pending().await?,
            impact,
        })
    }

    /// Products awaiting review, oldest first.
    pub async fn pending_products(&self) -> AppResult<Vec<product::Model>> {
        self.product_repo.list_pending().await
    }

    /// All products, filtered.
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        page: u64,
        limit: u64,
    ) -> AppResult<Vec<product::Model>> {
        let (_, limit, offset) = page_bounds(page, limit);
        self.product_repo.list_filtered(filter, limit, offset).await
    }

    /// Deactivated products, optionally of one deactivation type.
    pub async fn deactivated_products(
        &self,
        deactivation_type: Option<DeactivationType>,
    ) -> AppResult<Vec<product::Model>> {
        self.product_repo.list_deactivated(deactivation_type).await
    }

    /// Any product, regardless of status.
    pub async fn get_product(&self, product_id: &str) -> AppResult<product::Model> {
        self.product_repo.get_by_id(product_id).await
    }

    /// Non-admin users, newest first.
    pub async fn list_users(&self, page: u64, limit: u64) -> AppResult<Vec<user::Model>> {
        let (_, limit, offset) = page_bounds(page, limit);
        self.user_repo.list_users(limit, offset).await
    }

    /// Reports, newest first, with the reported product's name.
    pub async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        page: u64,
        limit: u64,
    ) -> AppResult<Vec<ReportView>> {
        let (_, limit, offset) = page_bounds(page, limit);
        let reports = self.report_repo.list(status, limit, offset).await?;
        let names = product_names(&self.product_repo, &reports).await?;

        Ok(reports
            .into_iter()
            .map(|report| ReportView {
                product_name: names
                    .get(&report.product_id)
                    .cloned()
                    .unwrap_or_else(|| DELETED_PRODUCT_NAME.to_string()),
                report,
            })
            .collect())
    }
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::notification::tests::{FailingSink, RecordingSink};
    use crate::services::product::{ProductService, PublishInput, ReportProductInput};
    use std::sync::Arc;
    use upcycle_db::entities::report::ReportReason;
    use upcycle_db::entities::user::UserStatus;
    use upcycle_db::repositories::SubmissionRepository;
    use upcycle_db::test_utils::TestDatabase;

    struct Harness {
        db: TestDatabase,
        moderation: ModerationService,
        products: ProductService,
        sink: Arc<RecordingSink>,
    }

    async fn harness() -> Harness {
        let db = TestDatabase::new().await.unwrap();
        db.create_admin("admin").await.unwrap();
        db.create_user("u1").await.unwrap();
        db.create_completed_submission("s1", "u1", 3, "Idea")
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let conn = db.connection();
        let notifier = Notifier::direct(sink.clone());

        let moderation = ModerationService::new(
            ModerationRepository::new(conn.clone()),
            ProductRepository::new(conn.clone()),
            UserRepository::new(conn.clone()),
            ReportRepository::new(conn.clone()),
            notifier.clone(),
        );
        let products = ProductService::new(
            ProductRepository::new(conn.clone()),
            SubmissionRepository::new(conn.clone()),
            ReportRepository::new(conn),
            notifier,
        );

        Harness {
            db,
            moderation,
            products,
            sink,
        }
    }

    impl Harness {
        async fn owner(&self) -> user::Model {
            UserRepository::new(self.db.connection())
                .get_by_id("u1")
                .await
                .unwrap()
        }

        async fn product(&self, id: &str) -> product::Model {
            ProductRepository::new(self.db.connection())
                .get_by_id(id)
                .await
                .unwrap()
        }

        async fn publish(&self, idea_index: i32) -> product::Model {
            let owner = self.owner().await;
            self.products
                .publish(
                    &owner,
                    PublishInput {
                        submission_id: "s1".to_string(),
                        idea_index,
                    },
                )
                .await
                .unwrap()
        }

        /// Publish and approve one idea slot.
        async fn live(&self, idea_index: i32) -> product::Model {
            let product = self.publish(idea_index).await;
            self.moderation
                .approve_product(&product.id, "admin", None)
                .await
                .unwrap()
                .product
        }
    }

    fn deactivate_input(deactivation_type: DeactivationType) -> DeactivateProductInput {
        DeactivateProductInput {
            reason: "Misleading claims".to_string(),
            deactivation_type: Some(deactivation_type),
            admin_notes: None,
        }
    }

    #[tokio::test]
    async fn test_first_approval_verifies_owner_once() {
        let h = harness().await;

        let first = h.publish(0).await;
        let outcome = h
            .moderation
            .approve_product(&first.id, "admin", Some("Looks good".to_string()))
            .await
            .unwrap();
        assert!(outcome.owner_verified);
        assert!(outcome.product.is_live());
        assert!(outcome.product.published_at.is_some());
        assert_eq!(outcome.product.admin_notes.as_deref(), Some("Looks good"));

        let verified_at = h.owner().await.verified_at;
        assert!(verified_at.is_some());

        let second = h.publish(1).await;
        let outcome = h
            .moderation
            .approve_product(&second.id, "admin", None)
            .await
            .unwrap();
        assert!(!outcome.owner_verified);

        let owner = h.owner().await;
        assert!(owner.is_verified);
        assert_eq!(owner.verified_at, verified_at);
    }

    #[tokio::test]
    async fn test_approve_twice_is_precondition() {
        let h = harness().await;
        let product = h.live(0).await;

        let result = h.moderation.approve_product(&product.id, "admin", None).await;
        assert!(matches!(result, Err(AppError::Precondition { .. })));
    }

    #[tokio::test]
    async fn test_approval_waits_for_owner_reactivation() {
        let h = harness().await;
        let product = h.publish(0).await;
        h.moderation
            .suspend_user("u1", "admin", "Chargebacks")
            .await
            .unwrap();

        match h.moderation.approve_product(&product.id, "admin", None).await {
            Err(AppError::Precondition { required, actual, .. }) => {
                assert_eq!(required, "active");
                assert_eq!(actual, "suspended");
            }
            other => panic!("expected precondition, got {other:?}"),
        }
        assert_eq!(
            h.product(&product.id).await.status,
            ProductStatus::PendingVerification
        );
        assert!(!h.owner().await.is_verified);
        assert!(!h.sink.kinds().contains(&"product_approved"));

        h.moderation.reactivate_user("u1", true).await.unwrap();
        let outcome = h
            .moderation
            .approve_product(&product.id, "admin", None)
            .await
            .unwrap();
        assert!(outcome.owner_verified);
    }

    #[tokio::test]
    async fn test_reject_requires_reason_and_is_terminal() {
        let h = harness().await;
        let product = h.publish(0).await;

        let result = h.moderation.reject_product(&product.id, "admin", "", None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let rejected = h
            .moderation
            .reject_product(&product.id, "admin", "Image does not match", None)
            .await
            .unwrap();
        assert_eq!(rejected.status, ProductStatus::Rejected);

        let result = h.moderation.approve_product(&product.id, "admin", None).await;
        assert!(matches!(result, Err(AppError::Precondition { .. })));
        assert_eq!(h.sink.kinds(), vec!["product_submitted", "product_rejected"]);
    }

    #[tokio::test]
    async fn test_deactivate_and_reactivate_product() {
        let h = harness().await;
        let product = h.live(0).await;

        let deactivated = h
            .moderation
            .deactivate_product(
                &product.id,
                "admin",
                deactivate_input(DeactivationType::PolicyViolation),
            )
            .await
            .unwrap();
        assert_eq!(deactivated.status, ProductStatus::Deactivated);
        assert_eq!(deactivated.previous_status, Some(ProductStatus::Approved));
        assert!(!deactivated.is_public);

        let reactivated = h
            .moderation
            .reactivate_product(&product.id, "admin", Some("Appeal accepted".to_string()))
            .await
            .unwrap();
        assert_eq!(reactivated.status, ProductStatus::Approved);
        assert!(reactivated.previous_status.is_none());
        assert!(reactivated.deactivation_type.is_none());
        assert!(reactivated.is_public);
        assert_eq!(
            reactivated.admin_notes.as_deref(),
            Some("Reactivation: Appeal accepted")
        );
    }

    #[tokio::test]
    async fn test_manual_suspension_type_is_rejected() {
        let h = harness().await;
        let product = h.live(0).await;

        let result = h
            .moderation
            .deactivate_product(
                &product.id,
                "admin",
                deactivate_input(DeactivationType::UserSuspension),
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_suspension_cascade_restores_only_its_own_deactivations() {
        let h = harness().await;
        let by_admin = h.live(0).await;
        let by_suspension = h.live(1).await;
        let pending = h.publish(2).await;

        h.moderation
            .deactivate_product(
                &by_admin.id,
                "admin",
                deactivate_input(DeactivationType::AdminAction),
            )
            .await
            .unwrap();

        let outcome = h.moderation.suspend_user("u1", "admin", "Fraud").await.unwrap();
        assert_eq!(outcome.user.status, UserStatus::Suspended);
        assert_eq!(outcome.affected_products, 1);

        let cascaded = h.product(&by_suspension.id).await;
        assert_eq!(cascaded.status, ProductStatus::Deactivated);
        assert_eq!(cascaded.deactivation_type, Some(DeactivationType::UserSuspension));
        assert_eq!(cascaded.previous_status, Some(ProductStatus::Approved));
        assert_eq!(
            h.product(&pending.id).await.status,
            ProductStatus::PendingVerification
        );

        // Blocked while suspended, whatever the notes
        let result = h
            .moderation
            .reactivate_product(&by_suspension.id, "admin", Some("override".to_string()))
            .await;
        assert!(matches!(result, Err(AppError::Precondition { .. })));

        let outcome = h.moderation.reactivate_user("u1", true).await.unwrap();
        assert_eq!(outcome.user.status, UserStatus::Active);
        assert!(outcome.user.suspension_reason.is_none());
        assert_eq!(outcome.affected_products, 1);

        let restored = h.product(&by_suspension.id).await;
        assert_eq!(restored.status, ProductStatus::Approved);
        assert!(restored.is_public);
        assert!(restored.previous_status.is_none());

        let untouched = h.product(&by_admin.id).await;
        assert_eq!(untouched.status, ProductStatus::Deactivated);
        assert_eq!(untouched.deactivation_type, Some(DeactivationType::AdminAction));
    }

    #[tokio::test]
    async fn test_reactivate_user_without_products() {
        let h = harness().await;
        let product = h.live(0).await;

        h.moderation.suspend_user("u1", "admin", "Fraud").await.unwrap();
        let outcome = h.moderation.reactivate_user("u1", false).await.unwrap();
        assert_eq!(outcome.affected_products, 0);
        assert_eq!(h.product(&product.id).await.status, ProductStatus::Deactivated);
    }

    #[tokio::test]
    async fn test_admins_cannot_be_suspended() {
        let h = harness().await;
        let result = h.moderation.suspend_user("admin", "admin", "Oops").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let result = h.moderation.suspend_user("u1", "admin", "   ").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_resolve_report_with_deactivation() {
        let h = harness().await;
        let product = h.live(0).await;

        let report = h
            .products
            .report_product(
                &product.id,
                ReportProductInput {
                    reporter_email: "r@example.com".to_string(),
                    reason: ReportReason::Misleading,
                    details: Some("Numbers are invented".to_string()),
                },
            )
            .await
            .unwrap();

        let outcome = h
            .moderation
            .resolve_report(
                &report.id,
                "admin",
                ResolveReportInput {
                    action: ResolutionAction::Deactivate,
                    admin_notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.report.status, ReportStatus::Resolved);
        let deactivated = outcome.deactivated_product.unwrap();
        assert_eq!(deactivated.status, ProductStatus::Deactivated);
        assert_eq!(deactivated.deactivation_type, Some(DeactivationType::PolicyViolation));
        assert_eq!(
            deactivated.deactivation_reason.as_deref(),
            Some("Report resolved: misleading: Numbers are invented")
        );
        assert!(h.sink.kinds().contains(&"product_deactivated_by_report"));

        // Report-driven deactivations are not restored by a user reactivation cascade
        h.moderation.suspend_user("u1", "admin", "Fraud").await.unwrap();
        let outcome = h.moderation.reactivate_user("u1", true).await.unwrap();
        assert_eq!(outcome.affected_products, 0);
    }

    #[tokio::test]
    async fn test_resolve_report_for_deleted_product() {
        let h = harness().await;
        let product = h.live(0).await;
        let report = h
            .products
            .report_product(
                &product.id,
                ReportProductInput {
                    reporter_email: "r@example.com".to_string(),
                    reason: ReportReason::Spam,
                    details: None,
                },
            )
            .await
            .unwrap();

        ProductRepository::new(h.db.connection())
            .delete_and_unpublish(&product)
            .await
            .unwrap();

        let outcome = h
            .moderation
            .resolve_report(
                &report.id,
                "admin",
                ResolveReportInput {
                    action: ResolutionAction::Deactivate,
                    admin_notes: Some("Gone already".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.report.status, ReportStatus::Resolved);
        assert!(outcome.deactivated_product.is_none());

        let views = h.moderation.list_reports(None, 1, 20).await.unwrap();
        assert_eq!(views[0].product_name, DELETED_PRODUCT_NAME);

        let again = h
            .moderation
            .resolve_report(
                &report.id,
                "admin",
                ResolveReportInput {
                    action: ResolutionAction::Dismiss,
                    admin_notes: None,
                },
            )
            .await;
        assert!(matches!(again, Err(AppError::Precondition { .. })));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_approval() {
        let h = harness().await;
        let product = h.publish(0).await;

        let conn = h.db.connection();
        let moderation = ModerationService::new(
            ModerationRepository::new(conn.clone()),
            ProductRepository::new(conn.clone()),
            UserRepository::new(conn.clone()),
            ReportRepository::new(conn),
            Notifier::direct(Arc::new(FailingSink)),
        );

        let outcome = moderation.approve_product(&product.id, "admin", None).await.unwrap();
        assert!(outcome.owner_verified);
    }

    #[tokio::test]
    async fn test_dashboard_stats() {
        let h = harness().await;
        h.live(0).await;
        h.publish(1).await;

        let stats = h.moderation.dashboard_stats().await.unwrap();
        assert_eq!(stats.users.total, 1);
        assert_eq!(stats.users.verified, 1);
        assert_eq!(stats.products.approved, 1);
        assert_eq!(stats.products.pending, 1);
        assert_eq!(stats.impact.total_co2_saved, 2718);
        assert_eq!(stats.impact.avg_profit_margin, 22);
    }
}
