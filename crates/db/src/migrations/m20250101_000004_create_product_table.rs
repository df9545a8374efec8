//! Create product table migration.

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
                    .table(Product::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Product::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Product::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(Product::SubmissionId).string_len(32).not_null())
                    .col(ColumnDef::new(Product::IdeaIndex).integer().not_null())
                    .col(ColumnDef::new(Product::Name).string_len(256).not_null())
                    .col(ColumnDef::new(Product::Description).text().not_null())
                    .col(ColumnDef::new(Product::TargetMarket).string_len(512).not_null())
                    .col(ColumnDef::new(Product::ImageUrl).text().not_null())
                    .col(ColumnDef::new(Product::Material).string_len(512).not_null())
                    .col(ColumnDef::new(Product::Quantity).string_len(128).not_null())
                    .col(ColumnDef::new(Product::Industry).string_len(256).not_null())
                    .col(ColumnDef::new(Product::Properties).json_binary().not_null())
                    .col(ColumnDef::new(Product::Co2Saved).big_integer().not_null())
                    .col(ColumnDef::new(Product::WaterSaved).big_integer().not_null())
                    .col(ColumnDef::new(Product::ProfitMargin).integer().not_null())
                    .col(ColumnDef::new(Product::FeasibilityScore).integer().not_null())
                    .col(
                        ColumnDef::new(Product::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending_verification"),
                    )
                    .col(ColumnDef::new(Product::PreviousStatus).string_len(32))
                    .col(ColumnDef::new(Product::DeactivationType).string_len(32))
                    .col(ColumnDef::new(Product::DeactivationReason).text())
                    .col(ColumnDef::new(Product::DeactivatedBy).string_len(32))
                    .col(ColumnDef::new(Product::DeactivatedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Product::RejectionReason).text())
                    .col(ColumnDef::new(Product::ReviewedBy).string_len(32))
                    .col(ColumnDef::new(Product::ReviewedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Product::AdminNotes).text())
                    .col(ColumnDef::new(Product::IsPublic).boolean().not_null().default(false))
                    .col(ColumnDef::new(Product::PublishedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Product::ViewCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Product::ReportCount).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Product::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Product::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_user_id")
                            .from(Product::Table, Product::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: at most one live product per idea slot
        manager
            .create_index(
                Index::create()
                    .name("idx_product_submission_id_idea_index")
                    .table(Product::Table)
                    .col(Product::SubmissionId)
                    .col(Product::IdeaIndex)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (user_id, status) for the suspension cascade and my-products
        manager
            .create_index(
                Index::create()
                    .name("idx_product_user_id_status")
                    .table(Product::Table)
                    .col(Product::UserId)
                    .col(Product::Status)
                    .to_owned(),
            )
            .await?;

        // Index: (status, is_public) for the public listing
        manager
            .create_index(
                Index::create()
                    .name("idx_product_status_is_public")
                    .table(Product::Table)
                    .col(Product::Status)
                    .col(Product::IsPublic)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Product::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Product {
    Table,
    Id,
    UserId,
    SubmissionId,
    IdeaIndex,
    Name,
    Description,
    TargetMarket,
    ImageUrl,
    Material,
    Quantity,
    Industry,
    Properties,
    #[iden = "co2_saved"]
    Co2Saved,
    WaterSaved,
    ProfitMargin,
    FeasibilityScore,
    Status,
    PreviousStatus,
    DeactivationType,
    DeactivationReason,
    DeactivatedBy,
    DeactivatedAt,
    RejectionReason,
    ReviewedBy,
    ReviewedAt,
    AdminNotes,
    IsPublic,
    PublishedAt,
    ViewCount,
    ReportCount,
    CreatedAt,
    UpdatedAt,
}
