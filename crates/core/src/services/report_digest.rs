//! Daily digest of filed reports.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use sea_orm::ActiveEnum;

use upcycle_common::AppResult;
use upcycle_db::{
    entities::report,
    repositories::{ProductRepository, ReportRepository},
};

use crate::services::notification::{DigestEntry, NotificationEvent};

/// Name shown for reports whose product no longer exists.
pub const DELETED_PRODUCT_NAME: &str = "Deleted Product";

/// Names of the products the reports point at, keyed by product id.
/// Dangling references are absent from the map.
pub async fn product_names(
    product_repo: &ProductRepository,
    reports: &[report::Model],
) -> AppResult<HashMap<String, String>> {
    let mut ids: Vec<String> = reports.iter().map(|r| r.product_id.clone()).collect();
    ids.sort();
    ids.dedup();

    Ok(product_repo
        .find_by_ids(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect())
}

/// Collects the reports of the last 24 hours into a digest event.
#[derive(Clone)]
pub struct ReportDigestService {
    report_repo: ReportRepository,
    product_repo: ProductRepository,
}

impl ReportDigestService {
    #[must_use]
    pub const fn new(report_repo: ReportRepository, product_repo: ProductRepository) -> Self {
        Self {
            report_repo,
            product_repo,
        }
    }

    /// The digest event, or `None` when nothing was reported.
    pub async fn collect(&self) -> AppResult<Option<NotificationEvent>> {
        let since = (Utc::now() - Duration::hours(24)).fixed_offset();
        let reports = self.report_repo.list_since(since).await?;

        if reports.is_empty() {
            return Ok(None);
        }

        let names = product_names(&self.product_repo, &reports).await?;
        let entries = reports
            .into_iter()
            .map(|r| DigestEntry {
                product_name: names
                    .get(&r.product_id)
                    .cloned()
                    .unwrap_or_else(|| DELETED_PRODUCT_NAME.to_string()),
                reason: r.reason.to_value(),
                reporter_email: r.reporter_email,
                created_at: r.created_at,
            })
            .collect();

        Ok(Some(NotificationEvent::ReportDigest { entries }))
    }
}
