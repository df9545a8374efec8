//! Test utilities for database operations.
//!
//! Provides an in-memory SQLite database with the real migrations applied, plus
//! fixture helpers for the rows most tests start from.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, Set,
};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::entities::{
    idea,
    product::{self, ProductStatus},
    report::{self, ReportReason, ReportStatus},
    submission::{self, SubmissionStatus},
    user::{self, UserRole, UserStatus},
};
use crate::migrations::Migrator;

/// A throwaway database for one test.
pub struct TestDatabase {
    /// Database connection.
    pub conn: Arc<DatabaseConnection>,
}

impl TestDatabase {
    /// Create a fresh in-memory database and run all migrations.
    ///
    /// The pool is capped at one connection so every query sees the same
    /// in-memory database.
    pub async fn new() -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);

        let conn = Database::connect(opt).await?;
        Migrator::up(&conn, None).await?;

        info!("Created in-memory test database");

        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Get the database connection.
    #[must_use]
    pub fn connection(&self) -> Arc<DatabaseConnection> {
        self.conn.clone()
    }

    /// Insert an active, unverified user.
    pub async fn create_user(&self, id: &str) -> Result<user::Model, DbErr> {
        self.insert_user(id, UserRole::User).await
    }

    /// Insert an active admin.
    pub async fn create_admin(&self, id: &str) -> Result<user::Model, DbErr> {
        self.insert_user(id, UserRole::Admin).await
    }

    async fn insert_user(&self, id: &str, role: UserRole) -> Result<user::Model, DbErr> {
        user::ActiveModel {
            id: Set(id.to_string()),
            email: Set(format!("{id}@example.com")),
            name: Set(format!("User {id}")),
            company_name: Set(None),
            token: Set(Some(format!("token-{id}"))),
            role: Set(role),
            status: Set(UserStatus::Active),
            suspension_reason: Set(None),
            suspended_at: Set(None),
            suspended_by: Set(None),
            is_verified: Set(false),
            verified_at: Set(None),
            verified_by: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        }
        .insert(self.conn.as_ref())
        .await
    }

    /// Insert a completed submission with `idea_count` ideas named
    /// `"{name_prefix} {index}"`.
    pub async fn create_completed_submission(
        &self,
        id: &str,
        user_id: &str,
        idea_count: i32,
        name_prefix: &str,
    ) -> Result<submission::Model, DbErr> {
        let now = Utc::now();
        let submission = submission::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set(user_id.to_string()),
            material: Set("Cotton textile waste".to_string()),
            quantity: Set("15 tons/month".to_string()),
            properties: Set(serde_json::json!(["clean", "sorted"])),
            industry: Set("Textile Manufacturing".to_string()),
            status: Set(SubmissionStatus::Completed),
            error_message: Set(None),
            created_at: Set(now.into()),
            completed_at: Set(Some(now.into())),
        }
        .insert(self.conn.as_ref())
        .await?;

        for index in 0..idea_count {
            idea::ActiveModel {
                id: Set(format!("{id}-idea-{index}")),
                submission_id: Set(id.to_string()),
                idea_index: Set(index),
                name: Set(format!("{name_prefix} {index}")),
                description: Set(format!("Description of {name_prefix} {index}")),
                target_market: Set("Construction".to_string()),
                image_url: Set(format!("https://img.example.com/{id}/{index}.png")),
                research_questions: Set(serde_json::json!([])),
                success_factors: Set(serde_json::json!([])),
                co2_saved: Set(2718),
                water_saved: Set(126_000_000),
                profit_margin: Set(22),
                feasibility_score: Set(80),
                is_published: Set(false),
                published_product_id: Set(None),
                created_at: Set(now.into()),
            }
            .insert(self.conn.as_ref())
            .await?;
        }

        Ok(submission)
    }

    /// Insert a product awaiting verification for idea slot `idea_index` of
    /// an existing submission.
    pub async fn create_pending_product(
        &self,
        id: &str,
        user_id: &str,
        submission_id: &str,
        idea_index: i32,
    ) -> Result<product::Model, DbErr> {
        product::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set(user_id.to_string()),
            submission_id: Set(submission_id.to_string()),
            idea_index: Set(idea_index),
            name: Set(format!("Product {id}")),
            description: Set("Wall panels".to_string()),
            target_market: Set("Construction".to_string()),
            image_url: Set("https://img.example.com/p.png".to_string()),
            material: Set("Cotton textile waste".to_string()),
            quantity: Set("15 tons/month".to_string()),
            industry: Set("Textile Manufacturing".to_string()),
            properties: Set(serde_json::json!([])),
            co2_saved: Set(2718),
            water_saved: Set(126_000_000),
            profit_margin: Set(22),
            feasibility_score: Set(80),
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
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        }
        .insert(self.conn.as_ref())
        .await
    }

    /// Insert a pending report against `product_id`.
    pub async fn create_report(
        &self,
        id: &str,
        product_id: &str,
    ) -> Result<report::Model, DbErr> {
        report::ActiveModel {
            id: Set(id.to_string()),
            product_id: Set(product_id.to_string()),
            reporter_email: Set("reporter@example.com".to_string()),
            reason: Set(ReportReason::Spam),
            details: Set(None),
            status: Set(ReportStatus::Pending),
            resolution_action: Set(None),
            resolved_by: Set(None),
            resolved_at: Set(None),
            admin_notes: Set(None),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.conn.as_ref())
        .await
    }
}
