//! Published product entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product moderation status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[sea_orm(string_value = "pending_verification")]
    #[default]
    PendingVerification,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "deactivated")]
    Deactivated,
}

/// Why a product was deactivated. Scopes which reactivation path applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum DeactivationType {
    #[sea_orm(string_value = "admin_action")]
    AdminAction,
    #[sea_orm(string_value = "user_suspension")]
    UserSuspension,
    #[sea_orm(string_value = "policy_violation")]
    PolicyViolation,
    #[sea_orm(string_value = "user_request")]
    UserRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub user_id: String,

    /// Provenance: the submission and idea slot this product was published from
    pub submission_id: String,
    pub idea_index: i32,

    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub target_market: String,

    #[sea_orm(column_type = "Text")]
    pub image_url: String,

    // Copied from the submission
    pub material: String,
    pub quantity: String,
    pub industry: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub properties: Json,

    // Copied from the idea
    pub co2_saved: i64,
    pub water_saved: i64,
    pub profit_margin: i32,
    pub feasibility_score: i32,

    pub status: ProductStatus,

    /// Set iff status = deactivated
    #[sea_orm(nullable)]
    pub previous_status: Option<ProductStatus>,

    #[sea_orm(nullable)]
    pub deactivation_type: Option<DeactivationType>,

    #[sea_orm(column_type = "Text", nullable)]
    pub deactivation_reason: Option<String>,

    #[sea_orm(nullable)]
    pub deactivated_by: Option<String>,

    #[sea_orm(nullable)]
    pub deactivated_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,

    #[sea_orm(nullable)]
    pub reviewed_by: Option<String>,

    #[sea_orm(nullable)]
    pub reviewed_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub admin_notes: Option<String>,

    #[sea_orm(default_value = false)]
    pub is_public: bool,

    #[sea_orm(nullable)]
    pub published_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(default_value = 0)]
    pub view_count: i32,

    #[sea_orm(default_value = 0)]
    pub report_count: i32,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether the product is on the public surface.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status == ProductStatus::Approved && self.is_public
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Restrict"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
