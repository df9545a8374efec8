//! Business logic services.

#![allow(missing_docs)]

pub mod idea_generator;
pub mod image_provider;
pub mod impact;
pub mod jobs;
pub mod lifecycle;
pub mod moderation;
pub mod notification;
pub mod product;
pub mod report_digest;
pub mod submission;

pub use idea_generator::{
    ChatCompletionsGenerator, ExcludedIdea, GeneratedIdea, IdeaGenerator, WasteInput,
};
pub use image_provider::{
    CraiyonProvider, HuggingFaceProvider, ImagePrompt, ImageProvider, ImageProviderChain,
    ImageProviderError, UnsplashProvider,
};
pub use impact::ImpactMetrics;
pub use jobs::{Job, JobSender, JobService, JobWorkerContext};
pub use moderation::{
    ApprovalOutcome, DashboardStats, DeactivateProductInput, ModerationService, ReportView,
    ResolveOutcome, ResolveReportInput, UserModerationOutcome,
};
pub use notification::{
    NoOpNotificationSink, NotificationEvent, NotificationSink, NotificationSinkService, Notifier,
    Recipient, SmtpNotificationSink, sink_from_config,
};
pub use product::{
    MyProducts, ProductService, PublicProducts, PublishInput, ReportProductInput,
};
pub use report_digest::ReportDigestService;
pub use submission::{
    SubmissionEvent, SubmissionPage, SubmissionService, SubmissionStats, SubmissionStatusView,
    SubmissionWithIdeas, SubmitResponse, SubmitWasteInput,
};

/// Largest page size any listing accepts.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Page size used when the caller passes none.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Normalize 1-based paging parameters into `(page, limit, offset)`.
#[must_use]
pub fn page_bounds(page: u64, limit: u64) -> (u64, u64, u64) {
    let page = page.max(1);
    let limit = if limit == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        limit.min(MAX_PAGE_SIZE)
    };
    (page, limit, (page - 1) * limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(1, 20), (1, 20, 0));
        assert_eq!(page_bounds(3, 10), (3, 10, 20));
        assert_eq!(page_bounds(0, 0), (1, DEFAULT_PAGE_SIZE, 0));
        assert_eq!(page_bounds(2, 500), (2, MAX_PAGE_SIZE, MAX_PAGE_SIZE));
    }
}
