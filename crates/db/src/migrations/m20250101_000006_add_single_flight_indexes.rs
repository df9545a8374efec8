//! Partial unique indexes enforcing one in-flight submission and one pending
//! product per user.
//!
//! The services check these conditions before inserting; the indexes close the
//! window between check and insert. Plain SQL is used because partial indexes
//! are not expressible through the schema builder. The syntax is shared by
//! PostgreSQL and SQLite.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_submission_single_processing
                ON submission (user_id)
                WHERE status = 'processing';
                ",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_product_single_pending
                ON product (user_id)
                WHERE status = 'pending_verification';
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_submission_single_processing;")
            .await?;

        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_product_single_pending;")
            .await?;

        Ok(())
    }
}
