//! Product service: publishing ideas and the user-facing product surface.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{ActiveEnum, ActiveValue::Set};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use upcycle_common::{AppError, AppResult, IdGenerator};
use upcycle_db::{
    entities::{
        product::{self, ProductStatus},
        report::{self, ReportReason, ReportStatus},
        submission::SubmissionStatus,
        user,
    },
    repositories::{ProductRepository, ReportRepository, SubmissionRepository},
};

use crate::services::notification::{NotificationEvent, Notifier, Recipient};
use crate::services::page_bounds;

/// Input for publishing an idea.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PublishInput {
    #[validate(length(min = 1))]
    pub submission_id: String,
    #[validate(range(min = 0))]
    pub idea_index: i32,
}

/// Input for reporting a product.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportProductInput {
    #[validate(email)]
    pub reporter_email: String,
    pub reason: ReportReason,
    #[validate(length(max = 2000))]
    pub details: Option<String>,
}

/// Per-status counts of a user's products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductCounts {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub deactivated: u64,
}

/// A user's products.
#[derive(Debug, Clone, Serialize)]
pub struct MyProducts {
    pub products: Vec<product::Model>,
    pub total: u64,
    pub counts: ProductCounts,
    pub page: u64,
    pub limit: u64,
}

/// Aggregates over the public catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicStats {
    pub total: u64,
    pub total_co2_saved: i64,
    pub total_water_saved: i64,
}

/// The public catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct PublicProducts {
    pub products: Vec<product::Model>,
    pub stats: PublicStats,
}

/// Product service.
#[derive(Clone)]
pub struct ProductService {
    product_repo: ProductRepository,
    submission_repo: SubmissionRepository,
    report_repo: ReportRepository,
    notifier: Notifier,
    id_gen: IdGenerator,
}

impl ProductService {
    /// Create a new product service.
    #[must_use]
    pub const fn new(
        product_repo: ProductRepository,
        submission_repo: SubmissionRepository,
        report_repo: ReportRepository,
        notifier: Notifier,
    ) -> Self {
        Self {
            product_repo,
            submission_repo,
            report_repo,
            notifier,
            id_gen: IdGenerator::new(),
        }
    }

    // ==================== Publishing ====================

    /// Publish an idea as a product pending verification.
    ///
    /// An owner holds at most one pending product, and an idea slot backs at
    /// most one product until that product is deleted.
    pub async fn publish(
        &self,
        owner: &user::Model,
        input: PublishInput,
    ) -> AppResult<product::Model> {
        input.validate()?;

        let submission = self
            .submission_repo
            .get_owned(&input.submission_id, &owner.id)
            .await?;

        if submission.status != SubmissionStatus::Completed {
            return Err(AppError::precondition(
                "Only ideas of completed submissions can be published",
                SubmissionStatus::Completed.to_value(),
                submission.status.to_value(),
            ));
        }

        let idea = self
            .submission_repo
            .find_idea(&submission.id, input.idea_index)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Idea {} of submission {}",
                    input.idea_index, submission.id
                ))
            })?;

        if idea.is_published {
            return Err(AppError::conflict(
                "This idea has already been published",
                idea.published_product_id,
            ));
        }

        if let Some(pending) = self.product_repo.find_pending_for_user(&owner.id).await? {
            return Err(pending_conflict(pending.id));
        }

        let now = now();
        let model = product::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(owner.id.clone()),
            submission_id: Set(submission.id.clone()),
            idea_index: Set(idea.idea_index),
            name: Set(idea.name.clone()),
            description: Set(idea.description.clone()),
            target_market: Set(idea.target_market.clone()),
            image_url: Set(idea.image_url.clone()),
            material: Set(submission.material.clone()),
            quantity: Set(submission.quantity.clone()),
            industry: Set(submission.industry.clone()),
            properties: Set(submission.properties.clone()),
            co2_saved: Set(idea.co2_saved),
            water_saved: Set(idea.water_saved),
            profit_margin: Set(idea.profit_margin),
            feasibility_score: Set(idea.feasibility_score),
            status: Set(ProductStatus::PendingVerification),
            previous_status: Set(None),
            deactivation_type: Set(None),
            deactivation_reason: Set(None),
            deactivated_by: Set(None),
            deactivated_at: Set(None),
            rejection_reason: Set(None),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            admin_notes: Set(None),
            is_public: Set(false),
            published_at: Set(None),
            view_count: Set(0),
            report_count: Set(0),
            created_at: Set(now),
            updated_at: Set(None),
        };

        let product = match self.product_repo.publish(model, &idea.id).await {
            Ok(product) => product,
            // A unique index caught a concurrent publish; name the winner if it is the pending slot
            Err(AppError::Conflict {
                message,
                existing_id,
            }) => {
                return Err(match self.product_repo.find_pending_for_user(&owner.id).await? {
                    Some(pending) => pending_conflict(pending.id),
                    None => AppError::Conflict {
                        message,
                        existing_id,
                    },
                });
            }
            Err(e) => return Err(e),
        };

        info!(product_id = %product.id, user_id = %owner.id, "Product submitted for verification");

        self.notifier
            .notify(NotificationEvent::ProductSubmitted {
                owner: Recipient::from(owner),
                company_name: owner.company_name.clone(),
                product_name: product.name.clone(),
            })
            .await;

        Ok(product)
    }

    /// Delete a product that never went live. The idea slot can be published again.
    pub async fn delete(&self, product_id: &str, user_id: &str) -> AppResult<()> {
        let product = self.get_owned(product_id, user_id).await?;

        if !matches!(
            product.status,
            ProductStatus::PendingVerification | ProductStatus::Rejected
        ) {
            return Err(AppError::precondition(
                "Only pending or rejected products can be deleted",
                "pending_verification or rejected",
                product.status.to_value(),
            ));
        }

        self.product_repo.delete_and_unpublish(&product).await?;
        info!(product_id = %product_id, "Product deleted");
        Ok(())
    }

    // ==================== Reads ====================

    /// The user's products with per-status counts.
    pub async fn my_products(&self, user_id: &str, page: u64, limit: u64) -> AppResult<MyProducts> {
        let (page, limit, offset) = page_bounds(page, limit);

        let products = self.product_repo.list_for_user(user_id, limit, offset).await?;
        let total = self.product_repo.count_for_user(user_id, None).await?;

        let counts = ProductCounts {
            pending: self
                .product_repo
                .count_for_user(user_id, Some(ProductStatus::PendingVerification))
                .await?,
            approved: self
                .product_repo
                .count_for_user(user_id, Some(ProductStatus::Approved))
                .await?,
            rejected: self
                .product_repo
                .count_for_user(user_id, Some(ProductStatus::Rejected))
                .await?,
            deactivated: self
                .product_repo
                .count_for_user(user_id, Some(ProductStatus::Deactivated))
                .await?,
        };

        Ok(MyProducts {
            products,
            total,
            counts,
            page,
            limit,
        })
    }

    /// A product as seen by `viewer`.
    ///
    /// Owners and admins see any status; everyone else only live products.
    /// A view by anyone but the owner counts towards `view_count`.
    pub async fn get_product(
        &self,
        product_id: &str,
        viewer: Option<&user::Model>,
    ) -> AppResult<product::Model> {
        let mut product = self.product_repo.get_by_id(product_id).await?;

        let is_owner = viewer.is_some_and(|v| v.id == product.user_id);
        let is_admin = viewer.is_some_and(user::Model::is_admin);

        if !product.is_live() && !is_owner && !is_admin {
            return Err(AppError::ProductNotFound(product_id.to_string()));
        }

        if product.is_live() && !is_owner {
            self.product_repo.increment_view_count(product_id).await?;
            product.view_count += 1;
        }

        Ok(product)
    }

    /// Approved public products, newest first, with catalogue totals.
    pub async fn public_products(&self) -> AppResult<PublicProducts> {
        let products = self.product_repo.list_public().await?;

        let stats = PublicStats {
            total: products.len() as u64,
            total_co2_saved: products.iter().map(|p| p.co2_saved).sum(),
            total_water_saved: products.iter().map(|p| p.water_saved).sum(),
        };

        Ok(PublicProducts { products, stats })
    }

    // ==================== Reporting ====================

    /// File a public report against an approved product.
    pub async fn report_product(
        &self,
        product_id: &str,
        input: ReportProductInput,
    ) -> AppResult<report::Model> {
        input.validate()?;

        let product = self.product_repo.get_by_id(product_id).await?;
        if product.status != ProductStatus::Approved {
            return Err(AppError::precondition(
                "Only approved products can be reported",
                ProductStatus::Approved.to_value(),
                product.status.to_value(),
            ));
        }

        let reporter_email = input.reporter_email.trim().to_lowercase();
        if let Some(existing) = self
            .report_repo
            .find_pending_by_reporter(product_id, &reporter_email)
            .await?
        {
            return Err(AppError::conflict(
                "You have already reported this product",
                Some(existing.id),
            ));
        }

        let report = self
            .report_repo
            .create(report::ActiveModel {
                id: Set(self.id_gen.generate()),
                product_id: Set(product_id.to_string()),
                reporter_email: Set(reporter_email),
                reason: Set(input.reason),
                details: Set(input
                    .details
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())),
                status: Set(ReportStatus::Pending),
                resolution_action: Set(None),
                resolved_by: Set(None),
                resolved_at: Set(None),
                admin_notes: Set(None),
                created_at: Set(now()),
            })
            .await?;

        info!(report_id = %report.id, product_id = %product_id, "Product reported");
        Ok(report)
    }

    async fn get_owned(&self, product_id: &str, user_id: &str) -> AppResult<product::Model> {
        let product = self.product_repo.get_by_id(product_id).await?;
        if product.user_id != user_id {
            return Err(AppError::ProductNotFound(product_id.to_string()));
        }
        Ok(product)
    }
}

fn pending_conflict(pending_id: String) -> AppError {
    AppError::conflict(
        "You already have a product pending verification",
        Some(pending_id),
    )
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}
