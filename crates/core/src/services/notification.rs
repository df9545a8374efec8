//! Notification sink.
//!
//! Moderation and submission services emit [`NotificationEvent`]s through a
//! [`Notifier`]. Delivery is fire-and-forget: failures are logged and never
//! reach the operation that triggered them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use upcycle_common::{
    AppError, AppResult,
    config::{NotificationConfig, SmtpConfig},
};

use crate::services::jobs::{Job, JobSender};

/// The person an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

impl From<&upcycle_db::entities::user::Model> for Recipient {
    fn from(user: &upcycle_db::entities::user::Model) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// One line of the report digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestEntry {
    pub product_name: String,
    pub reason: String,
    pub reporter_email: String,
    pub created_at: DateTime<FixedOffset>,
}

/// Events delivered to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// A user published a product; goes to the admin address.
    ProductSubmitted {
        owner: Recipient,
        company_name: Option<String>,
        product_name: String,
    },
    ProductApproved {
        owner: Recipient,
        product_name: String,
        /// This approval granted the owner's verification.
        newly_verified: bool,
    },
    ProductRejected {
        owner: Recipient,
        product_name: String,
        reason: String,
    },
    ProductDeactivated {
        owner: Recipient,
        product_name: String,
        reason: String,
    },
    ProductDeactivatedByReport {
        owner: Recipient,
        product_name: String,
        report_reason: String,
    },
    ProductReactivated {
        owner: Recipient,
        product_name: String,
    },
    UserSuspended {
        user: Recipient,
        reason: String,
    },
    UserReactivated {
        user: Recipient,
        reactivated_products: u64,
    },
    /// Reports filed in the last day; goes to the admin address.
    ReportDigest { entries: Vec<DigestEntry> },
}

/// Who receives an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience<'a> {
    Admin,
    User(&'a Recipient),
}

impl NotificationEvent {
    /// Short event name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProductSubmitted { .. } => "product_submitted",
            Self::ProductApproved { .. } => "product_approved",
            Self::ProductRejected { .. } => "product_rejected",
            Self::ProductDeactivated { .. } => "product_deactivated",
            Self::ProductDeactivatedByReport { .. } => "product_deactivated_by_report",
            Self::ProductReactivated { .. } => "product_reactivated",
            Self::UserSuspended { .. } => "user_suspended",
            Self::UserReactivated { .. } => "user_reactivated",
            Self::ReportDigest { .. } => "report_digest",
        }
    }

    #[must_use]
    pub fn audience(&self) -> Audience<'_> {
        match self {
            Self::ProductSubmitted { .. } | Self::ReportDigest { .. } => Audience::Admin,
            Self::ProductApproved { owner, .. }
            | Self::ProductRejected { owner, .. }
            | Self::ProductDeactivated { owner, .. }
            | Self::ProductDeactivatedByReport { owner, .. }
            | Self::ProductReactivated { owner, .. } => Audience::User(owner),
            Self::UserSuspended { user, .. } | Self::UserReactivated { user, .. } => {
                Audience::User(user)
            }
        }
    }

    /// Subject and plain-text body.
    #[must_use]
    pub fn render(&self) -> (String, String) {
        match self {
            Self::ProductSubmitted {
                owner,
                company_name,
                product_name,
            } => (
                format!("New product awaiting review: {product_name}"),
                format!(
                    "{} ({}) from {} submitted \"{product_name}\" for verification.",
                    owner.name,
                    owner.email,
                    company_name.as_deref().unwrap_or("an unnamed company"),
                ),
            ),
            Self::ProductApproved {
                owner,
                product_name,
                newly_verified,
            } => {
                let mut body = format!(
                    "Hello {},\n\nYour product \"{product_name}\" has been approved and is now publicly visible.",
                    owner.name
                );
                if *newly_verified {
                    body.push_str("\n\nYour account is now verified.");
                }
                (format!("Your product \"{product_name}\" was approved"), body)
            }
            Self::ProductRejected {
                owner,
                product_name,
                reason,
            } => (
                format!("Your product \"{product_name}\" was not approved"),
                format!(
                    "Hello {},\n\nYour product \"{product_name}\" was not approved.\n\nReason: {reason}",
                    owner.name
                ),
            ),
            Self::ProductDeactivated {
                owner,
                product_name,
                reason,
            } => (
                format!("Your product \"{product_name}\" was deactivated"),
                format!(
                    "Hello {},\n\nYour product \"{product_name}\" is no longer publicly visible.\n\nReason: {reason}",
                    owner.name
                ),
            ),
            Self::ProductDeactivatedByReport {
                owner,
                product_name,
                report_reason,
            } => (
                format!("Your product \"{product_name}\" was deactivated after a report"),
                format!(
                    "Hello {},\n\nFollowing a report, your product \"{product_name}\" is no longer publicly visible.\n\nReported reason: {report_reason}",
                    owner.name
                ),
            ),
            Self::ProductReactivated {
                owner,
                product_name,
            } => (
                format!("Your product \"{product_name}\" is live again"),
                format!(
                    "Hello {},\n\nYour product \"{product_name}\" has been reactivated and is publicly visible again.",
                    owner.name
                ),
            ),
            Self::UserSuspended { user, reason } => (
                "Your account has been suspended".to_string(),
                format!(
                    "Hello {},\n\nYour account has been suspended and your products are no longer visible.\n\nReason: {reason}",
                    user.name
                ),
            ),
            Self::UserReactivated {
                user,
                reactivated_products,
            } => (
                "Your account has been reactivated".to_string(),
                format!(
                    "Hello {},\n\nYour account is active again. {reactivated_products} product(s) were restored.",
                    user.name
                ),
            ),
            Self::ReportDigest { entries } => {
                let mut body = format!("{} report(s) were filed in the last 24 hours:\n", entries.len());
                for entry in entries {
                    body.push_str(&format!(
                        "\n- {} | {} | {} | {}",
                        entry.product_name,
                        entry.reason,
                        entry.reporter_email,
                        entry.created_at.to_rfc3339()
                    ));
                }
                (format!("Daily report digest ({})", entries.len()), body)
            }
        }
    }
}

/// Destination for notification events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one event.
    async fn send(&self, event: &NotificationEvent) -> AppResult<()>;
}

/// Wrapper for boxed NotificationSink trait object.
pub type NotificationSinkService = Arc<dyn NotificationSink>;

/// A no-op implementation for when no transport is configured.
#[derive(Clone, Default)]
pub struct NoOpNotificationSink;

#[async_trait]
impl NotificationSink for NoOpNotificationSink {
    async fn send(&self, event: &NotificationEvent) -> AppResult<()> {
        debug!(kind = event.kind(), "Notification dropped, no transport configured");
        Ok(())
    }
}

/// Email delivery over SMTP.
pub struct SmtpNotificationSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    admin_email: Option<String>,
}

impl SmtpNotificationSink {
    /// Create a new SMTP sink.
    pub fn new(smtp: &SmtpConfig, admin_email: Option<String>) -> AppResult<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .map_err(|e| AppError::Config(format!("Invalid SMTP host: {e}")))?
            .port(smtp.port);

        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = smtp
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| AppError::Config(format!("Invalid sender address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
            admin_email,
        })
    }
}

#[async_trait]
impl NotificationSink for SmtpNotificationSink {
    async fn send(&self, event: &NotificationEvent) -> AppResult<()> {
        let to = match event.audience() {
            Audience::User(recipient) => recipient.email.as_str(),
            Audience::Admin => match &self.admin_email {
                Some(address) => address.as_str(),
                None => {
                    debug!(kind = event.kind(), "No admin address configured, skipping");
                    return Ok(());
                }
            },
        };

        let to = to
            .parse::<Mailbox>()
            .map_err(|e| AppError::ExternalService(format!("Invalid recipient address: {e}")))?;
        let (subject, body) = event.render();

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::ExternalService(format!("SMTP delivery failed: {e}")))?;

        info!(kind = event.kind(), "Notification email sent");
        Ok(())
    }
}

/// Build the sink described by configuration.
pub fn sink_from_config(config: &NotificationConfig) -> AppResult<NotificationSinkService> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(SmtpNotificationSink::new(
            smtp,
            config.admin_email.clone(),
        )?)),
        None => {
            info!("SMTP not configured, notifications are disabled");
            Ok(Arc::new(NoOpNotificationSink))
        }
    }
}

/// Front used by services to emit events.
///
/// `queued` hands events to the background job queue; `direct` awaits the
/// sink inline. Neither ever returns an error to the caller.
#[derive(Clone)]
pub struct Notifier {
    inner: NotifierInner,
}

#[derive(Clone)]
enum NotifierInner {
    Queued(JobSender),
    Direct(NotificationSinkService),
}

impl Notifier {
    #[must_use]
    pub const fn queued(sender: JobSender) -> Self {
        Self {
            inner: NotifierInner::Queued(sender),
        }
    }

    #[must_use]
    pub const fn direct(sink: NotificationSinkService) -> Self {
        Self {
            inner: NotifierInner::Direct(sink),
        }
    }

    /// Emit an event. Failures are logged and swallowed.
    pub async fn notify(&self, event: NotificationEvent) {
        let kind = event.kind();
        match &self.inner {
            NotifierInner::Queued(sender) => {
                if let Err(e) = sender.enqueue(Job::Notify { event }).await {
                    warn!(kind, error = %e, "Failed to enqueue notification");
                }
            }
            NotifierInner::Direct(sink) => {
                if let Err(e) = sink.send(&event).await {
                    warn!(kind, error = %e, "Failed to deliver notification");
                }
            }
        }
    }
}
