//! Generated idea entity.
//!
//! One row per idea slot of a completed submission.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idea")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub submission_id: String,

    /// Position within the submission, starting at 0
    pub idea_index: i32,

    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub target_market: String,

    #[sea_orm(column_type = "Text")]
    pub image_url: String,

    /// JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub research_questions: Json,

    /// JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub success_factors: Json,

    /// Annual CO2 saved, kg
    pub co2_saved: i64,

    /// Annual water saved, litres
    pub water_saved: i64,

    /// Percent, 5..=40
    pub profit_margin: i32,

    /// Percent, 50..=95
    pub feasibility_score: i32,

    #[sea_orm(default_value = false)]
    pub is_published: bool,

    #[sea_orm(nullable)]
    pub published_product_id: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::submission::Entity",
        from = "Column::SubmissionId",
        to = "super::submission::Column::Id",
        on_delete = "Cascade"
    )]
    Submission,
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
