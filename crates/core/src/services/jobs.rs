//! Job processing service for background tasks.
//!
//! Submission generation, notification delivery and the report digest run on
//! an in-memory queue drained by a bounded pool of workers. Jobs are never
//! retried; a failing job logs and finishes.

use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info};

use crate::services::idea_generator::ExcludedIdea;
use crate::services::notification::{NotificationEvent, NotificationSinkService};
use crate::services::report_digest::ReportDigestService;
use crate::services::submission::SubmissionService;

/// Default number of concurrent job workers.
pub const MAX_WORKERS: usize = 4;

/// Channel buffer size for jobs.
const JOB_BUFFER_SIZE: usize = 1000;

/// Job types that can be processed.
#[derive(Debug, Clone)]
pub enum Job {
    /// Generate and enrich ideas for a submission in `processing`.
    ProcessSubmission {
        submission_id: String,
        /// Ideas a re-analysis must not repeat. Empty for first analyses.
        exclusions: Vec<ExcludedIdea>,
    },
    /// Deliver a notification.
    Notify { event: NotificationEvent },
    /// Send the digest of recently filed reports.
    ReportDigest,
}

impl Job {
    const fn kind(&self) -> &'static str {
        match self {
            Self::ProcessSubmission { .. } => "process_submission",
            Self::Notify { .. } => "notify",
            Self::ReportDigest => "report_digest",
        }
    }
}

/// Job sender for enqueueing jobs.
#[derive(Clone)]
pub struct JobSender {
    sender: mpsc::Sender<Job>,
}

impl JobSender {
    /// Enqueue a job for processing.
    pub async fn enqueue(&self, job: Job) -> Result<(), &'static str> {
        self.sender.send(job).await.map_err(|_| "Job queue is closed")
    }

    /// Enqueue submission processing.
    pub async fn process_submission(
        &self,
        submission_id: String,
        exclusions: Vec<ExcludedIdea>,
    ) -> Result<(), &'static str> {
        self.enqueue(Job::ProcessSubmission {
            submission_id,
            exclusions,
        })
        .await
    }

    /// Enqueue the report digest.
    pub async fn report_digest(&self) -> Result<(), &'static str> {
        self.enqueue(Job::ReportDigest).await
    }
}

/// Job worker context containing services needed for job processing.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub submissions: Option<SubmissionService>,
    pub notifications: NotificationSinkService,
    pub report_digest: Option<ReportDigestService>,
}

/// Job processing service.
pub struct JobService {
    sender: mpsc::Sender<Job>,
    receiver: mpsc::Receiver<Job>,
    max_workers: usize,
}

impl JobService {
    /// Create a new job service running at most `max_workers` jobs at once.
    #[must_use]
    pub fn new(max_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel(JOB_BUFFER_SIZE);
        Self {
            sender,
            receiver,
            max_workers: max_workers.max(1),
        }
    }

    /// Get a job sender for enqueueing jobs.
    #[must_use]
    pub fn sender(&self) -> JobSender {
        JobSender {
            sender: self.sender.clone(),
        }
    }

    /// Start the job processor with the given context.
    /// This consumes the service and spawns the dispatcher task.
    pub fn start(self, context: JobWorkerContext) -> tokio::task::JoinHandle<()> {
        let Self {
            sender,
            receiver,
            max_workers,
        } = self;
        // Only external senders keep the queue open
        drop(sender);
        let context = Arc::new(context);

        tokio::spawn(async move {
            info!("Job worker starting with {} workers", max_workers);
            run_job_processor(receiver, context, max_workers).await;
            info!("Job worker stopped");
        })
    }
}

impl Default for JobService {
    fn default() -> Self {
        Self::new(MAX_WORKERS)
    }
}

/// Run the job processor.
async fn run_job_processor(
    mut receiver: mpsc::Receiver<Job>,
    context: Arc<JobWorkerContext>,
    max_workers: usize,
) {
    // Use a semaphore to limit concurrent workers
    let semaphore = Arc::new(Semaphore::new(max_workers));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            error!("Job semaphore closed, stopping dispatcher");
            break;
        };
        let ctx = context.clone();

        tokio::spawn(async move {
            let _permit = permit;
            process_job(job, &ctx).await;
        });
    }
}

/// Process a single job.
async fn process_job(job: Job, context: &JobWorkerContext) {
    debug!(kind = job.kind(), "Processing job");

    match job {
        Job::ProcessSubmission {
            submission_id,
            exclusions,
        } => {
            let Some(ref submissions) = context.submissions else {
                error!(submission_id = %submission_id, "Submission service not available, job dropped");
                return;
            };
            submissions.process(&submission_id, &exclusions).await;
        }
        Job::Notify { event } => {
            if let Err(e) = context.notifications.send(&event).await {
                error!(kind = event.kind(), error = %e, "Failed to deliver notification");
            }
        }
        Job::ReportDigest => {
            let Some(ref digest) = context.report_digest else {
                debug!("Report digest not available, skipping");
                return;
            };
            match digest.collect().await {
                Ok(Some(event)) => {
                    if let Err(e) = context.notifications.send(&event).await {
                        error!(error = %e, "Failed to deliver report digest");
                    }
                }
                Ok(None) => debug!("No reports in the last day, digest skipped"),
                Err(e) => error!(error = %e, "Failed to collect report digest"),
            }
        }
    }
}
