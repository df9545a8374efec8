//! Create idea table migration.

use sea_orm_migration::prelude::*;

use super::m20250101_000002_create_submission_table::Submission;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Idea::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Idea::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Idea::SubmissionId).string_len(32).not_null())
                    .col(ColumnDef::new(Idea::IdeaIndex).integer().not_null())
                    .col(ColumnDef::new(Idea::Name).string_len(256).not_null())
                    .col(ColumnDef::new(Idea::Description).text().not_null())
                    .col(ColumnDef::new(Idea::TargetMarket).string_len(512).not_null())
                    .col(ColumnDef::new(Idea::ImageUrl).text().not_null())
                    .col(ColumnDef::new(Idea::ResearchQuestions).json_binary().not_null())
                    .col(ColumnDef::new(Idea::SuccessFactors).json_binary().not_null())
                    .col(ColumnDef::new(Idea::Co2Saved).big_integer().not_null())
                    .col(ColumnDef::new(Idea::WaterSaved).big_integer().not_null())
                    .col(ColumnDef::new(Idea::ProfitMargin).integer().not_null())
                    .col(ColumnDef::new(Idea::FeasibilityScore).integer().not_null())
                    .col(ColumnDef::new(Idea::IsPublished).boolean().not_null().default(false))
                    .col(ColumnDef::new(Idea::PublishedProductId).string_len(32))
                    .col(
                        ColumnDef::new(Idea::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_idea_submission_id")
                            .from(Idea::Table, Idea::SubmissionId)
                            .to(Submission::Table, Submission::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: one idea per (submission, slot)
        manager
            .create_index(
                Index::create()
                    .name("idx_idea_submission_id_idea_index")
                    .table(Idea::Table)
                    .col(Idea::SubmissionId)
                    .col(Idea::IdeaIndex)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Idea::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Idea {
    Table,
    Id,
    SubmissionId,
    IdeaIndex,
    Name,
    Description,
    TargetMarket,
    ImageUrl,
    ResearchQuestions,
    SuccessFactors,
    #[iden = "co2_saved"]
    Co2Saved,
    WaterSaved,
    ProfitMargin,
    FeasibilityScore,
    IsPublished,
    PublishedProductId,
    CreatedAt,
}
