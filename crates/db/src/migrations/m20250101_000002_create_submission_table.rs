//! Create submission table migration.

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_user_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Submission::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Submission::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Submission::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(Submission::Material).string_len(512).not_null())
                    .col(ColumnDef::new(Submission::Quantity).string_len(128).not_null())
                    .col(ColumnDef::new(Submission::Properties).json_binary().not_null())
                    .col(ColumnDef::new(Submission::Industry).string_len(256).not_null())
                    .col(
                        ColumnDef::new(Submission::Status)
                            .string_len(16)
                            .not_null()
                            .default("processing"),
                    )
                    .col(ColumnDef::new(Submission::ErrorMessage).text())
                    .col(
                        ColumnDef::new(Submission::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Submission::CompletedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_submission_user_id")
                            .from(Submission::Table, Submission::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (user_id, created_at) for history
        manager
            .create_index(
                Index::create()
                    .name("idx_submission_user_id_created_at")
                    .table(Submission::Table)
                    .col(Submission::UserId)
                    .col(Submission::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: (user_id, status) for admission and duplicate checks
        manager
            .create_index(
                Index::create()
                    .name("idx_submission_user_id_status")
                    .table(Submission::Table)
                    .col(Submission::UserId)
                    .col(Submission::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Submission::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Submission {
    Table,
    Id,
    UserId,
    Material,
    Quantity,
    Properties,
    Industry,
    Status,
    ErrorMessage,
    CreatedAt,
    CompletedAt,
}
