//! Submission and idea repository.

use std::sync::Arc;

use crate::entities::{
    Idea, Submission, idea,
    submission::{self, SubmissionStatus},
};
use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait, sea_query::Expr,
};
use upcycle_common::{AppError, AppResult};

/// Submission repository for database operations.
#[derive(Clone)]
pub struct SubmissionRepository {
    db: Arc<DatabaseConnection>,
}

impl SubmissionRepository {
    /// Create a new submission repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a submission by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<submission::Model>> {
        Submission::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a submission owned by `user_id`. Other users' submissions are
    /// reported as missing.
    pub async fn get_owned(&self, id: &str, user_id: &str) -> AppResult<submission::Model> {
        self.find_by_id(id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| AppError::SubmissionNotFound(id.to_string()))
    }

    /// Insert a new submission.
    ///
    /// A second `processing` row for the same user violates a unique index and
    /// surfaces as [`AppError::Conflict`].
    pub async fn create(&self, model: submission::ActiveModel) -> AppResult<submission::Model> {
        model.insert(self.db.as_ref()).await.map_err(AppError::from)
    }

    /// The user's in-flight submission, if any.
    pub async fn find_processing(&self, user_id: &str) -> AppResult<Option<submission::Model>> {
        Submission::find()
            .filter(submission::Column::UserId.eq(user_id))
            .filter(submission::Column::Status.eq(SubmissionStatus::Processing))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Completed submissions of `user_id` with exactly these inputs, newest first.
    pub async fn find_completed_with_inputs(
        &self,
        user_id: &str,
        material: &str,
        quantity: &str,
        industry: &str,
    ) -> AppResult<Vec<submission::Model>> {
        Submission::find()
            .filter(submission::Column::UserId.eq(user_id))
            .filter(submission::Column::Status.eq(SubmissionStatus::Completed))
            .filter(submission::Column::Material.eq(material))
            .filter(submission::Column::Quantity.eq(quantity))
            .filter(submission::Column::Industry.eq(industry))
            .order_by_desc(submission::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Submissions of a user, newest first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<submission::Model>> {
        Submission::find()
            .filter(submission::Column::UserId.eq(user_id))
            .order_by_desc(submission::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count submissions of a user.
    pub async fn count_for_user(&self, user_id: &str) -> AppResult<u64> {
        Submission::find()
            .filter(submission::Column::UserId.eq(user_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All completed submissions of a user.
    pub async fn list_completed_for_user(
        &self,
        user_id: &str,
    ) -> AppResult<Vec<submission::Model>> {
        Submission::find()
            .filter(submission::Column::UserId.eq(user_id))
            .filter(submission::Column::Status.eq(SubmissionStatus::Completed))
            .order_by_desc(submission::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write the generated ideas and flip the submission to `completed`.
    ///
    /// Both happen in one transaction. Returns `false` without writing anything
    /// if the submission is no longer `processing`.
    pub async fn complete(
        &self,
        id: &str,
        ideas: Vec<idea::ActiveModel>,
        now: DateTime<FixedOffset>,
    ) -> AppResult<bool> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = Submission::update_many()
            .col_expr(
                submission::Column::Status,
                Expr::value(SubmissionStatus::Completed),
            )
            .col_expr(submission::Column::CompletedAt, Expr::value(now))
            .filter(submission::Column::Id.eq(id))
            .filter(submission::Column::Status.eq(SubmissionStatus::Processing))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Ok(false);
        }

        if !ideas.is_empty() {
            Idea::insert_many(ideas)
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(true)
    }

    /// Flip a `processing` submission to `failed` with a message.
    ///
    /// Returns `false` if the submission had already left `processing`.
    pub async fn fail(
        &self,
        id: &str,
        message: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<bool> {
        let result = Submission::update_many()
            .col_expr(submission::Column::Status, Expr::value(SubmissionStatus::Failed))
            .col_expr(submission::Column::ErrorMessage, Expr::value(message))
            .col_expr(submission::Column::CompletedAt, Expr::value(now))
            .filter(submission::Column::Id.eq(id))
            .filter(submission::Column::Status.eq(SubmissionStatus::Processing))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Fail every submission still in `processing`.
    ///
    /// Jobs live only in memory, so a row left in `processing` by an earlier
    /// run has nothing left to finish it. Returns the number of rows failed.
    pub async fn fail_stale_processing(
        &self,
        message: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<u64> {
        let result = Submission::update_many()
            .col_expr(submission::Column::Status, Expr::value(SubmissionStatus::Failed))
            .col_expr(submission::Column::ErrorMessage, Expr::value(message))
            .col_expr(submission::Column::CompletedAt, Expr::value(now))
            .filter(submission::Column::Status.eq(SubmissionStatus::Processing))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Delete a submission together with its ideas.
    pub async fn delete_with_ideas(&self, id: &str) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Idea::delete_many()
            .filter(idea::Column::SubmissionId.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Submission::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ========== Ideas ==========

    /// Ideas of a submission ordered by slot.
    pub async fn ideas_for(&self, submission_id: &str) -> AppResult<Vec<idea::Model>> {
        Idea::find()
            .filter(idea::Column::SubmissionId.eq(submission_id))
            .order_by_asc(idea::Column::IdeaIndex)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Ideas of several submissions.
    pub async fn ideas_for_many(&self, submission_ids: &[String]) -> AppResult<Vec<idea::Model>> {
        if submission_ids.is_empty() {
            return Ok(vec![]);
        }

        Idea::find()
            .filter(idea::Column::SubmissionId.is_in(submission_ids.to_vec()))
            .order_by_asc(idea::Column::SubmissionId)
            .order_by_asc(idea::Column::IdeaIndex)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count the ideas of a submission.
    pub async fn count_ideas(&self, submission_id: &str) -> AppResult<u64> {
        Idea::find()
            .filter(idea::Column::SubmissionId.eq(submission_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find one idea slot.
    pub async fn find_idea(
        &self,
        submission_id: &str,
        idea_index: i32,
    ) -> AppResult<Option<idea::Model>> {
        Idea::find()
            .filter(idea::Column::SubmissionId.eq(submission_id))
            .filter(idea::Column::IdeaIndex.eq(idea_index))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
