//! Product state machine.
//!
//! ```text
//! pending_verification ──approve──▶ approved ──deactivate──▶ deactivated
//!          │                           ▲                          │
//!          └──reject──▶ rejected       └────────reactivate────────┘
//! ```
//!
//! Each transition takes the current model and returns the active model to
//! persist, or a `Precondition` error naming the required and actual state.
//! `previous_status` is set exactly when a product enters `deactivated` and
//! cleared when it leaves.

use chrono::{DateTime, FixedOffset};
use sea_orm::{ActiveEnum, ActiveValue::Set};

use upcycle_common::{AppError, AppResult};
use upcycle_db::entities::{
    product::{self, DeactivationType, ProductStatus},
    user::{self, UserStatus},
};

fn expect_status(
    product: &product::Model,
    required: ProductStatus,
    message: &str,
) -> AppResult<()> {
    if product.status == required {
        Ok(())
    } else {
        Err(AppError::precondition(
            message,
            required.to_value(),
            product.status.to_value(),
        ))
    }
}

/// Trim a mandatory free-text field, rejecting blanks.
pub fn required_text(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `pending_verification → approved`. The product becomes public.
pub fn approve(
    product: product::Model,
    reviewer_id: &str,
    admin_notes: Option<String>,
    now: DateTime<FixedOffset>,
) -> AppResult<product::ActiveModel> {
    expect_status(
        &product,
        ProductStatus::PendingVerification,
        "Only products pending verification can be approved",
    )?;

    let mut active: product::ActiveModel = product.into();
    active.status = Set(ProductStatus::Approved);
    active.is_public = Set(true);
    active.published_at = Set(Some(now));
    active.reviewed_by = Set(Some(reviewer_id.to_string()));
    active.reviewed_at = Set(Some(now));
    if let Some(notes) = optional_text(admin_notes) {
        active.admin_notes = Set(Some(notes));
    }
    active.updated_at = Set(Some(now));
    Ok(active)
}

/// `pending_verification → rejected`. Terminal.
pub fn reject(
    product: product::Model,
    reviewer_id: &str,
    reason: &str,
    admin_notes: Option<String>,
    now: DateTime<FixedOffset>,
) -> AppResult<product::ActiveModel> {
    let reason = required_text(reason, "Rejection reason")?;
    expect_status(
        &product,
        ProductStatus::PendingVerification,
        "Only products pending verification can be rejected",
    )?;

    let mut active: product::ActiveModel = product.into();
    active.status = Set(ProductStatus::Rejected);
    active.is_public = Set(false);
    active.rejection_reason = Set(Some(reason));
    active.reviewed_by = Set(Some(reviewer_id.to_string()));
    active.reviewed_at = Set(Some(now));
    if let Some(notes) = optional_text(admin_notes) {
        active.admin_notes = Set(Some(notes));
    }
    active.updated_at = Set(Some(now));
    Ok(active)
}

/// `approved → deactivated`, remembering `approved` as the status to restore.
pub fn deactivate(
    product: product::Model,
    deactivation_type: DeactivationType,
    reason: &str,
    deactivated_by: &str,
    admin_notes: Option<String>,
    now: DateTime<FixedOffset>,
) -> AppResult<product::ActiveModel> {
    let reason = required_text(reason, "Deactivation reason")?;
    expect_status(
        &product,
        ProductStatus::Approved,
        "Only approved products can be deactivated",
    )?;

    let mut active: product::ActiveModel = product.into();
    active.previous_status = Set(Some(ProductStatus::Approved));
    active.status = Set(ProductStatus::Deactivated);
    active.is_public = Set(false);
    active.deactivation_type = Set(Some(deactivation_type));
    active.deactivation_reason = Set(Some(reason));
    active.deactivated_by = Set(Some(deactivated_by.to_string()));
    active.deactivated_at = Set(Some(now));
    if let Some(notes) = optional_text(admin_notes) {
        active.admin_notes = Set(Some(notes));
    }
    active.updated_at = Set(Some(now));
    Ok(active)
}

/// `deactivated → previous_status` (approved when unset).
///
/// Blocked while the owner is suspended, whatever the notes say. Notes are
/// appended to the admin notes as `Reactivation: <notes>`.
pub fn reactivate(
    product: product::Model,
    owner: &user::Model,
    notes: Option<String>,
    now: DateTime<FixedOffset>,
) -> AppResult<product::ActiveModel> {
    expect_status(
        &product,
        ProductStatus::Deactivated,
        "Only deactivated products can be reactivated",
    )?;

    if owner.status != UserStatus::Active {
        return Err(AppError::precondition(
            "Cannot reactivate a product while its owner is suspended",
            UserStatus::Active.to_value(),
            owner.status.to_value(),
        ));
    }

    let restored = product.previous_status.unwrap_or(ProductStatus::Approved);
    let admin_notes = match (product.admin_notes.clone(), optional_text(notes)) {
        (Some(existing), Some(notes)) => Some(format!("{existing}\nReactivation: {notes}")),
        (None, Some(notes)) => Some(format!("Reactivation: {notes}")),
        (existing, None) => existing,
    };

    let mut active: product::ActiveModel = product.into();
    active.status = Set(restored);
    active.previous_status = Set(None);
    active.is_public = Set(restored == ProductStatus::Approved);
    active.deactivation_type = Set(None);
    active.deactivation_reason = Set(None);
    active.deactivated_by = Set(None);
    active.deactivated_at = Set(None);
    active.admin_notes = Set(admin_notes);
    active.updated_at = Set(Some(now));
    Ok(active)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::ActiveValue;
    use upcycle_db::entities::user::UserRole;

    fn now() -> DateTime<FixedOffset> {
        Utc::now().fixed_offset()
    }

    fn product(status: ProductStatus) -> product::Model {
        product::Model {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            submission_id: "s1".to_string(),
            idea_index: 0,
            name: "Felt Tiles".to_string(),
            description: "Acoustic tiles".to_string(),
            target_market: "Offices".to_string(),
            image_url: "https://img/1.png".to_string(),
            material: "Wool felt".to_string(),
            quantity: "2 tons/month".to_string(),
            industry: "Textile".to_string(),
            properties: serde_json::json!([]),
            co2_saved: 100,
            water_saved: 1000,
            profit_margin: 20,
            feasibility_score: 80,
            status,
            previous_status: None,
            deactivation_type: None,
            deactivation_reason: None,
            deactivated_by: None,
            deactivated_at: None,
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            admin_notes: None,
            is_public: status == ProductStatus::Approved,
            published_at: None,
            view_count: 0,
            report_count: 0,
            created_at: now(),
            updated_at: None,
        }
    }

    fn owner(status: UserStatus) -> user::Model {
        user::Model {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            name: "U1".to_string(),
            company_name: None,
            token: None,
            role: UserRole::User,
            status,
            suspension_reason: None,
            suspended_at: None,
            suspended_by: None,
            is_verified: false,
            verified_at: None,
            verified_by: None,
            created_at: now(),
            updated_at: None,
        }
    }

    fn value<T: Into<sea_orm::Value>>(v: ActiveValue<T>) -> Option<T>
    where
        T: Clone,
    {
        match v {
            ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(v),
            ActiveValue::NotSet => None,
        }
    }

    #[test]
    fn test_approve_pending() {
        let active = approve(product(ProductStatus::PendingVerification), "a1", None, now()).unwrap();
        assert_eq!(value(active.status), Some(ProductStatus::Approved));
        assert_eq!(value(active.is_public), Some(true));
        assert!(value(active.published_at).unwrap().is_some());
        assert_eq!(value(active.reviewed_by).unwrap().as_deref(), Some("a1"));
    }

    #[test]
    fn test_approve_non_pending_is_precondition() {
        let err = approve(product(ProductStatus::Approved), "a1", None, now()).unwrap_err();
        match err {
            AppError::Precondition {
                required, actual, ..
            } => {
                assert_eq!(required, "pending_verification");
                assert_eq!(actual, "approved");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reject_requires_reason() {
        let result = reject(product(ProductStatus::PendingVerification), "a1", "  ", None, now());
        assert!(matches!(result, Err(AppError::Validation(_))));

        let active = reject(
            product(ProductStatus::PendingVerification),
            "a1",
            " Low quality image ",
            None,
            now(),
        )
        .unwrap();
        assert_eq!(value(active.status), Some(ProductStatus::Rejected));
        assert_eq!(
            value(active.rejection_reason).unwrap().as_deref(),
            Some("Low quality image")
        );
    }

    #[test]
    fn test_rejected_is_terminal() {
        let rejected = product(ProductStatus::Rejected);
        assert!(approve(rejected.clone(), "a1", None, now()).is_err());
        assert!(
            deactivate(rejected.clone(), DeactivationType::AdminAction, "x", "a1", None, now()).is_err()
        );
        assert!(reactivate(rejected, &owner(UserStatus::Active), None, now()).is_err());
    }

    #[test]
    fn test_deactivate_then_reactivate_restores_previous_status() {
        let active = deactivate(
            product(ProductStatus::Approved),
            DeactivationType::PolicyViolation,
            "Misleading claims",
            "a1",
            None,
            now(),
        )
        .unwrap();
        assert_eq!(value(active.previous_status.clone()), Some(Some(ProductStatus::Approved)));
        assert_eq!(value(active.is_public.clone()), Some(false));

        let mut deactivated = product(ProductStatus::Deactivated);
        deactivated.previous_status = Some(ProductStatus::Approved);
        deactivated.deactivation_type = Some(DeactivationType::PolicyViolation);
        deactivated.deactivation_reason = Some("Misleading claims".to_string());
        deactivated.is_public = false;

        let active = reactivate(
            deactivated,
            &owner(UserStatus::Active),
            Some("Fixed".to_string()),
            now(),
        )
        .unwrap();
        assert_eq!(value(active.status), Some(ProductStatus::Approved));
        assert_eq!(value(active.previous_status), Some(None));
        assert_eq!(value(active.deactivation_type), Some(None));
        assert_eq!(value(active.deactivation_reason), Some(None));
        assert_eq!(value(active.is_public), Some(true));
        assert_eq!(
            value(active.admin_notes).unwrap().as_deref(),
            Some("Reactivation: Fixed")
        );
    }

    #[test]
    fn test_reactivate_blocked_for_suspended_owner() {
        let deactivated = product(ProductStatus::Deactivated);
        for notes in [None, Some("please".to_string())] {
            let result = reactivate(
                deactivated.clone(),
                &owner(UserStatus::Suspended),
                notes,
                now(),
            );
            assert!(matches!(result, Err(AppError::Precondition { .. })));
        }
    }

    #[test]
    fn test_reactivation_notes_are_appended() {
        let mut deactivated = product(ProductStatus::Deactivated);
        deactivated.admin_notes = Some("Checked twice".to_string());

        let active = reactivate(
            deactivated,
            &owner(UserStatus::Active),
            Some("Appeal accepted".to_string()),
            now(),
        )
        .unwrap();
        assert_eq!(
            value(active.admin_notes).unwrap().as_deref(),
            Some("Checked twice\nReactivation: Appeal accepted")
        );
    }

    #[test]
    fn test_untouched_fields_stay_unchanged() {
        let active = approve(
            product(ProductStatus::PendingVerification),
            "a1",
            None,
            now(),
        )
        .unwrap();
        assert!(matches!(active.name, ActiveValue::Unchanged(ref name) if name == "Felt Tiles"));
        assert!(matches!(active.admin_notes, ActiveValue::Unchanged(None)));
    }
}
