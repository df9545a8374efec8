//! Submission pipeline.
//!
//! `submit` and `reanalyze` admit a submission, persist it in `processing`
//! and hand generation to the job queue. `process` runs out of band:
//! generation, exclusion filtering, image resolution and impact metrics, then
//! a single write that completes the submission. Any failure marks the
//! submission `failed`; nothing is retried.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use validator::Validate;

use upcycle_common::{AppError, AppResult, IdGenerator};
use upcycle_db::{
    entities::{
        idea,
        submission::{self, SubmissionStatus},
    },
    repositories::SubmissionRepository,
};

use crate::services::idea_generator::{
    ExcludedIdea, GeneratedIdea, IdeaGenerator, WasteInput, filter_excluded,
};
use crate::services::image_provider::{ImagePrompt, ImageProviderChain};
use crate::services::impact;
use crate::services::jobs::JobSender;
use crate::services::page_bounds;

/// Capacity of the submission event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Error recorded when a re-analysis only produced repeats.
pub const NO_NOVEL_IDEAS: &str = "No novel ideas were generated; every idea repeated an earlier one";

/// Error recorded on submissions whose job was lost to a restart.
pub const INTERRUPTED: &str = "Processing was interrupted by a server restart; please resubmit";

/// Input for submitting waste data.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitWasteInput {
    #[validate(length(min = 1, max = 200))]
    pub material: String,

    /// `<number> <unit>[/<period>]`, e.g. "15 tons/month"
    #[validate(length(min = 1, max = 100))]
    pub quantity: String,

    #[serde(default)]
    #[validate(length(max = 20))]
    pub properties: Vec<String>,

    #[validate(length(min = 1, max = 200))]
    pub industry: String,
}

/// Response to an accepted submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub submission_id: String,
    pub status: SubmissionStatus,
    /// Number of earlier ideas the re-analysis must avoid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_count: Option<usize>,
}

/// Polling view of a submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStatusView {
    pub status: SubmissionStatus,
    pub has_results: bool,
    pub ideas_count: u64,
    pub created_at: DateTime<FixedOffset>,
    pub error_message: Option<String>,
}

/// A submission with its ideas ordered by index.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionWithIdeas {
    #[serde(flatten)]
    pub submission: submission::Model,
    pub ideas: Vec<idea::Model>,
}

/// One page of a user's submissions.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionPage {
    pub submissions: Vec<SubmissionWithIdeas>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

/// Aggregates over a user's completed submissions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStats {
    pub total_submissions: u64,
    pub total_ideas: u64,
    pub total_co2_saved: i64,
    pub total_water_saved: i64,
    pub avg_profit_margin: i64,
    pub industries: Vec<String>,
}

/// Emitted when a submission reaches a terminal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEvent {
    pub submission_id: String,
    pub user_id: String,
    pub status: SubmissionStatus,
    pub ideas_count: usize,
    pub error_message: Option<String>,
}

/// Submission service.
#[derive(Clone)]
pub struct SubmissionService {
    submission_repo: SubmissionRepository,
    generator: Arc<dyn IdeaGenerator>,
    images: ImageProviderChain,
    jobs: JobSender,
    events: broadcast::Sender<SubmissionEvent>,
    id_gen: IdGenerator,
}

impl SubmissionService {
    /// Create a new submission service.
    #[must_use]
    pub fn new(
        submission_repo: SubmissionRepository,
        generator: Arc<dyn IdeaGenerator>,
        images: ImageProviderChain,
        jobs: JobSender,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            submission_repo,
            generator,
            images,
            jobs,
            events,
            id_gen: IdGenerator::new(),
        }
    }

    /// Subscribe to terminal submission events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SubmissionEvent> {
        self.events.subscribe()
    }

    /// Admit a new submission and queue its generation.
    pub async fn submit(
        &self,
        user_id: &str,
        input: SubmitWasteInput,
    ) -> AppResult<SubmitResponse> {
        input.validate()?;

        let material = input.material.trim().to_string();
        let quantity = input.quantity.trim().to_string();
        let industry = input.industry.trim().to_string();
        if material.is_empty() || industry.is_empty() {
            return Err(AppError::Validation(
                "Material and industry are required".to_string(),
            ));
        }
        if !impact::is_valid_quantity(&quantity) {
            return Err(AppError::Validation(
                "Quantity must look like \"<number> <unit>[/<period>]\", e.g. \"15 tons/month\""
                    .to_string(),
            ));
        }
        let properties: Vec<String> = input
            .properties
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        self.ensure_not_in_flight(user_id).await?;

        if let Some(existing) = self
            .submission_repo
            .find_completed_with_inputs(user_id, &material, &quantity, &industry)
            .await?
            .into_iter()
            .next()
        {
            return Err(AppError::conflict(
                "An identical submission has already been analysed",
                Some(existing.id),
            ));
        }

        let submission = self
            .insert_processing(user_id, material, quantity, properties, industry)
            .await?;
        self.queue(&submission, Vec::new()).await?;

        info!(submission_id = %submission.id, user_id = %user_id, "Submission accepted");

        Ok(SubmitResponse {
            submission_id: submission.id,
            status: SubmissionStatus::Processing,
            excluded_count: None,
        })
    }

    /// Run the pipeline again on a submission's input, excluding every idea
    /// already generated for the same input.
    pub async fn reanalyze(&self, submission_id: &str, user_id: &str) -> AppResult<SubmitResponse> {
        let original = self.submission_repo.get_owned(submission_id, user_id).await?;

        self.ensure_not_in_flight(user_id).await?;

        let earlier = self
            .submission_repo
            .find_completed_with_inputs(
                user_id,
                &original.material,
                &original.quantity,
                &original.industry,
            )
            .await?;
        let earlier_ids: Vec<String> = earlier.into_iter().map(|s| s.id).collect();
        let exclusions: Vec<ExcludedIdea> = self
            .submission_repo
            .ideas_for_many(&earlier_ids)
            .await?
            .into_iter()
            .map(|idea| ExcludedIdea {
                name: idea.name,
                description: idea.description,
            })
            .collect();
        let excluded_count = exclusions.len();

        let properties = original.property_tags();
        let submission = self
            .insert_processing(
                user_id,
                original.material,
                original.quantity,
                properties,
                original.industry,
            )
            .await?;
        self.queue(&submission, exclusions).await?;

        info!(
            submission_id = %submission.id,
            original_id = %submission_id,
            excluded_count,
            "Re-analysis accepted"
        );

        Ok(SubmitResponse {
            submission_id: submission.id,
            status: SubmissionStatus::Processing,
            excluded_count: Some(excluded_count),
        })
    }

    /// Polling read. No side effects.
    pub async fn get_status(
        &self,
        submission_id: &str,
        user_id: &str,
    ) -> AppResult<SubmissionStatusView> {
        let submission = self.submission_repo.get_owned(submission_id, user_id).await?;
        let ideas_count = self.submission_repo.count_ideas(submission_id).await?;

        Ok(SubmissionStatusView {
            status: submission.status,
            has_results: submission.status == SubmissionStatus::Completed && ideas_count > 0,
            ideas_count,
            created_at: submission.created_at,
            error_message: submission.error_message,
        })
    }

    /// A submission with its ideas.
    pub async fn get(&self, submission_id: &str, user_id: &str) -> AppResult<SubmissionWithIdeas> {
        let submission = self.submission_repo.get_owned(submission_id, user_id).await?;
        let ideas = self.submission_repo.ideas_for(submission_id).await?;
        Ok(SubmissionWithIdeas { submission, ideas })
    }

    /// The user's submissions, newest first.
    pub async fn history(&self, user_id: &str, page: u64, limit: u64) -> AppResult<SubmissionPage> {
        let (page, limit, offset) = page_bounds(page, limit);

        let submissions = self
            .submission_repo
            .list_for_user(user_id, limit, offset)
            .await?;
        let total = self.submission_repo.count_for_user(user_id).await?;

        let ids: Vec<String> = submissions.iter().map(|s| s.id.clone()).collect();
        let mut ideas = self.submission_repo.ideas_for_many(&ids).await?;

        let submissions = submissions
            .into_iter()
            .map(|submission| {
                let (own, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut ideas)
                    .into_iter()
                    .partition(|i| i.submission_id == submission.id);
                ideas = rest;
                SubmissionWithIdeas {
                    submission,
                    ideas: own,
                }
            })
            .collect();

        Ok(SubmissionPage {
            submissions,
            total,
            page,
            limit,
        })
    }

    /// Delete a finished submission and its ideas. Published products keep
    /// their copied content.
    pub async fn delete(&self, submission_id: &str, user_id: &str) -> AppResult<()> {
        let submission = self.submission_repo.get_owned(submission_id, user_id).await?;

        if submission.status == SubmissionStatus::Processing {
            return Err(AppError::precondition(
                "Cannot delete a submission while it is processing",
                "completed or failed",
                "processing",
            ));
        }

        self.submission_repo.delete_with_ideas(submission_id).await?;
        info!(submission_id = %submission_id, "Submission deleted");
        Ok(())
    }

    /// Aggregates over the user's completed submissions.
    pub async fn stats(&self, user_id: &str) -> AppResult<SubmissionStats> {
        let completed = self.submission_repo.list_completed_for_user(user_id).await?;
        let ids: Vec<String> = completed.iter().map(|s| s.id.clone()).collect();
        let ideas = self.submission_repo.ideas_for_many(&ids).await?;

        let industries: BTreeSet<String> = completed.iter().map(|s| s.industry.clone()).collect();
        let total_ideas = ideas.len() as u64;
        let avg_profit_margin = if ideas.is_empty() {
            0
        } else {
            let sum: i64 = ideas.iter().map(|i| i64::from(i.profit_margin)).sum();
            (sum as f64 / ideas.len() as f64).round() as i64
        };

        Ok(SubmissionStats {
            total_submissions: completed.len() as u64,
            total_ideas,
            total_co2_saved: ideas.iter().map(|i| i.co2_saved).sum(),
            total_water_saved: ideas.iter().map(|i| i.water_saved).sum(),
            avg_profit_margin,
            industries: industries.into_iter().collect(),
        })
    }

    /// Fail the submissions a previous run left in `processing`.
    ///
    /// Must run before the job worker starts; afterwards a `processing` row
    /// always has a queued or running job behind it.
    pub async fn fail_interrupted(&self) -> AppResult<u64> {
        let failed = self
            .submission_repo
            .fail_stale_processing(INTERRUPTED, now())
            .await?;
        if failed > 0 {
            warn!(count = failed, "Failed submissions interrupted by a restart");
        }
        Ok(failed)
    }

    /// Run generation for a submission in `processing`. Called by the job
    /// worker; never returns an error.
    pub async fn process(&self, submission_id: &str, exclusions: &[ExcludedIdea]) {
        let submission = match self.submission_repo.find_by_id(submission_id).await {
            Ok(Some(s)) if s.status == SubmissionStatus::Processing => s,
            Ok(Some(s)) => {
                warn!(submission_id = %submission_id, status = ?s.status, "Submission is not processing, skipping");
                return;
            }
            Ok(None) => {
                warn!(submission_id = %submission_id, "Submission vanished before processing");
                return;
            }
            Err(e) => {
                warn!(submission_id = %submission_id, error = %e, "Failed to load submission");
                return;
            }
        };

        let event = match self.generate(&submission, exclusions).await {
            Ok(ideas) => {
                let count = ideas.len();
                match self.submission_repo.complete(submission_id, ideas, now()).await {
                    Ok(true) => {
                        info!(submission_id = %submission_id, ideas = count, "Submission completed");
                        Some(self.event(&submission, SubmissionStatus::Completed, count, None))
                    }
                    Ok(false) => {
                        warn!(submission_id = %submission_id, "Submission left processing before completion");
                        None
                    }
                    Err(e) => self.mark_failed(&submission, &e).await,
                }
            }
            Err(e) => self.mark_failed(&submission, &e).await,
        };

        if let Some(event) = event {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    async fn generate(
        &self,
        submission: &submission::Model,
        exclusions: &[ExcludedIdea],
    ) -> AppResult<Vec<idea::ActiveModel>> {
        let input = WasteInput {
            material: submission.material.clone(),
            quantity: submission.quantity.clone(),
            properties: submission.property_tags(),
            industry: submission.industry.clone(),
        };

        let generated = self.generator.generate(&input, exclusions).await?;
        let returned = generated.len();
        let generated = filter_excluded(generated, exclusions);

        if generated.is_empty() {
            return Err(if exclusions.is_empty() || returned == 0 {
                AppError::ExternalService("Idea generator returned no ideas".to_string())
            } else {
                AppError::ExternalService(NO_NOVEL_IDEAS.to_string())
            });
        }

        let prompts: Vec<ImagePrompt> = generated
            .iter()
            .map(|idea| ImagePrompt {
                name: idea.name.clone(),
                description: idea.description.clone(),
                visual_description: idea.visual_description.clone(),
                keywords: idea.image_keywords.clone(),
            })
            .collect();
        let image_urls = self.images.resolve_all(&prompts).await;

        Ok(self.enrich(submission, generated, image_urls, now()))
    }

    fn enrich(
        &self,
        submission: &submission::Model,
        generated: Vec<GeneratedIdea>,
        image_urls: Vec<String>,
        now: DateTime<FixedOffset>,
    ) -> Vec<idea::ActiveModel> {
        let mut rng = rand::thread_rng();

        generated
            .into_iter()
            .zip(image_urls)
            .enumerate()
            .map(|(index, (idea, image_url))| {
                let metrics = impact::calculate(
                    &submission.material,
                    &submission.quantity,
                    &idea.name,
                    &mut rng,
                );

                idea::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    submission_id: Set(submission.id.clone()),
                    idea_index: Set(index as i32),
                    name: Set(idea.name),
                    description: Set(idea.description),
                    target_market: Set(idea.target_market),
                    image_url: Set(image_url),
                    research_questions: Set(serde_json::json!(idea.research_questions)),
                    success_factors: Set(serde_json::json!(idea.success_factors)),
                    co2_saved: Set(metrics.co2_saved),
                    water_saved: Set(metrics.water_saved),
                    profit_margin: Set(metrics.profit_margin),
                    feasibility_score: Set(metrics.feasibility_score),
                    is_published: Set(false),
                    published_product_id: Set(None),
                    created_at: Set(now),
                }
            })
            .collect()
    }

    async fn mark_failed(
        &self,
        submission: &submission::Model,
        error: &AppError,
    ) -> Option<SubmissionEvent> {
        let message = match error {
            AppError::ExternalService(message) => message.clone(),
            other => other.to_string(),
        };
        warn!(submission_id = %submission.id, error = %message, "Submission failed");

        match self.submission_repo.fail(&submission.id, &message, now()).await {
            Ok(true) => Some(self.event(submission, SubmissionStatus::Failed, 0, Some(message))),
            Ok(false) => None,
            Err(e) => {
                warn!(submission_id = %submission.id, error = %e, "Failed to record submission failure");
                None
            }
        }
    }

    fn event(
        &self,
        submission: &submission::Model,
        status: SubmissionStatus,
        ideas_count: usize,
        error_message: Option<String>,
    ) -> SubmissionEvent {
        SubmissionEvent {
            submission_id: submission.id.clone(),
            user_id: submission.user_id.clone(),
            status,
            ideas_count,
            error_message,
        }
    }

    async fn ensure_not_in_flight(&self, user_id: &str) -> AppResult<()> {
        match self.submission_repo.find_processing(user_id).await? {
            Some(existing) => Err(AppError::SubmissionInFlight {
                submission_id: existing.id,
            }),
            None => Ok(()),
        }
    }

    async fn insert_processing(
        &self,
        user_id: &str,
        material: String,
        quantity: String,
        properties: Vec<String>,
        industry: String,
    ) -> AppResult<submission::Model> {
        let model = submission::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            material: Set(material),
            quantity: Set(quantity),
            properties: Set(serde_json::json!(properties)),
            industry: Set(industry),
            status: Set(SubmissionStatus::Processing),
            error_message: Set(None),
            created_at: Set(now()),
            completed_at: Set(None),
        };

        match self.submission_repo.create(model).await {
            Ok(submission) => Ok(submission),
            // Lost the race against a concurrent submit for the same owner
            Err(AppError::Conflict { .. }) => {
                let existing = self.submission_repo.find_processing(user_id).await?;
                Err(AppError::SubmissionInFlight {
                    submission_id: existing.map(|s| s.id).unwrap_or_default(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn queue(
        &self,
        submission: &submission::Model,
        exclusions: Vec<ExcludedIdea>,
    ) -> AppResult<()> {
        if let Err(e) = self
            .jobs
            .process_submission(submission.id.clone(), exclusions)
            .await
        {
            warn!(submission_id = %submission.id, error = %e, "Failed to queue submission");
            self.submission_repo
                .fail(&submission.id, "Job queue unavailable", now())
                .await?;
            return Err(AppError::Internal("Job queue unavailable".to_string()));
        }
        Ok(())
    }
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::services::image_provider::tests::fast_config;
    use crate::services::jobs::{JobService, JobWorkerContext};
    use crate::services::notification::NoOpNotificationSink;
    use async_trait::async_trait;
    use sea_orm::ActiveModelTrait;
    use std::sync::Mutex;
    use upcycle_db::test_utils::TestDatabase;

    /// Generator returning a fixed result and recording the exclusions it saw.
    pub struct ScriptedGenerator {
        names: Option<Vec<&'static str>>,
        pub seen_exclusions: Mutex<Vec<Vec<ExcludedIdea>>>,
    }

    impl ScriptedGenerator {
        pub fn returning(names: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                names: Some(names),
                seen_exclusions: Mutex::new(Vec::new()),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                names: None,
                seen_exclusions: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl IdeaGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            _input: &WasteInput,
            exclusions: &[ExcludedIdea],
        ) -> AppResult<Vec<GeneratedIdea>> {
            self.seen_exclusions.lock().unwrap().push(exclusions.to_vec());
            let Some(names) = &self.names else {
                return Err(AppError::ExternalService("generator unavailable".to_string()));
            };
            Ok(names
                .iter()
                .map(|name| GeneratedIdea {
                    name: (*name).to_string(),
                    description: format!("{name} made from waste"),
                    target_market: "Retail".to_string(),
                    visual_description: None,
                    image_keywords: None,
                    research_questions: vec!["Who buys it?".to_string()],
                    success_factors: vec!["Supply".to_string()],
                })
                .collect())
        }
    }

    pub struct Harness {
        pub db: TestDatabase,
        pub service: SubmissionService,
        // Holds the queue open; jobs are run by calling `process` directly
        pub _jobs: JobService,
    }

    pub async fn harness(generator: Arc<dyn IdeaGenerator>) -> Harness {
        let db = TestDatabase::new().await.unwrap();
        db.create_user("u1").await.unwrap();
        let jobs = JobService::default();
        let service = SubmissionService::new(
            SubmissionRepository::new(db.connection()),
            generator,
            ImageProviderChain::with_providers(vec![], &fast_config()),
            jobs.sender(),
        );
        Harness {
            db,
            service,
            _jobs: jobs,
        }
    }

    fn textile_input() -> SubmitWasteInput {
        SubmitWasteInput {
            material: "Cotton textile waste".to_string(),
            quantity: "15 tons/month".to_string(),
            properties: vec!["soft".to_string(), " ".to_string()],
            industry: "Textile Manufacturing".to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_then_process_completes() {
        let h = harness(ScriptedGenerator::returning(vec!["EcoBrick Panels", "Denim Lamp"])).await;
        let mut events = h.service.subscribe();

        let response = h.service.submit("u1", textile_input()).await.unwrap();
        assert_eq!(response.status, SubmissionStatus::Processing);

        let status = h.service.get_status(&response.submission_id, "u1").await.unwrap();
        assert_eq!(status.status, SubmissionStatus::Processing);
        assert!(!status.has_results);

        h.service.process(&response.submission_id, &[]).await;

        let status = h.service.get_status(&response.submission_id, "u1").await.unwrap();
        assert_eq!(status.status, SubmissionStatus::Completed);
        assert!(status.has_results);
        assert_eq!(status.ideas_count, 2);

        let detail = h.service.get(&response.submission_id, "u1").await.unwrap();
        assert_eq!(detail.submission.property_tags(), vec!["soft".to_string()]);
        let first = &detail.ideas[0];
        assert_eq!(first.name, "EcoBrick Panels");
        assert_eq!(first.co2_saved, 2718);
        assert_eq!(first.water_saved, 126_000_000);
        assert!((5..=40).contains(&first.profit_margin));
        assert!(first.image_url.ends_with("/EcoBrick%20Panels/800/600"));

        let event = events.recv().await.unwrap();
        assert_eq!(event.status, SubmissionStatus::Completed);
        assert_eq!(event.ideas_count, 2);
    }

    #[tokio::test]
    async fn test_second_submit_while_processing_is_in_flight() {
        let h = harness(ScriptedGenerator::returning(vec!["A"])).await;

        let first = h.service.submit("u1", textile_input()).await.unwrap();
        let mut other = textile_input();
        other.material = "Scrap metal".to_string();

        match h.service.submit("u1", other).await {
            Err(AppError::SubmissionInFlight { submission_id }) => {
                assert_eq!(submission_id, first.submission_id);
            }
            other => panic!("expected in-flight error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_of_completed_is_conflict() {
        let h = harness(ScriptedGenerator::returning(vec!["A"])).await;
        h.db
            .create_completed_submission("s1", "u1", 2, "Idea")
            .await
            .unwrap();

        // Surrounding whitespace does not make an input different
        let mut input = textile_input();
        input.material = "  Cotton textile waste ".to_string();

        match h.service.submit("u1", input).await {
            Err(AppError::Conflict { existing_id, .. }) => {
                assert_eq!(existing_id.as_deref(), Some("s1"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_quantity_is_validation_error() {
        let h = harness(ScriptedGenerator::returning(vec!["A"])).await;
        let mut input = textile_input();
        input.quantity = "lots".to_string();

        let result = h.service.submit("u1", input).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_generator_failure_marks_failed() {
        let h = harness(ScriptedGenerator::failing()).await;
        let mut events = h.service.subscribe();

        let response = h.service.submit("u1", textile_input()).await.unwrap();
        h.service.process(&response.submission_id, &[]).await;

        let status = h.service.get_status(&response.submission_id, "u1").await.unwrap();
        assert_eq!(status.status, SubmissionStatus::Failed);
        assert_eq!(status.error_message.as_deref(), Some("generator unavailable"));
        assert_eq!(status.ideas_count, 0);

        let event = events.recv().await.unwrap();
        assert_eq!(event.status, SubmissionStatus::Failed);

        // Terminal: processing again changes nothing
        h.service.process(&response.submission_id, &[]).await;
        let status = h.service.get_status(&response.submission_id, "u1").await.unwrap();
        assert_eq!(status.status, SubmissionStatus::Failed);
    }

    #[tokio::test]
    async fn test_reanalysis_drops_repeated_ideas() {
        let generator = ScriptedGenerator::returning(vec!["ecobrick panels", "Denim Lamp"]);
        let h = harness(generator.clone()).await;
        h.db
            .create_completed_submission("s1", "u1", 2, "EcoBrick Panels")
            .await
            .unwrap();

        let response = h.service.reanalyze("s1", "u1").await.unwrap();
        assert_eq!(response.excluded_count, Some(2));

        let exclusions: Vec<ExcludedIdea> = h
            .service
            .submission_repo
            .ideas_for("s1")
            .await
            .unwrap()
            .into_iter()
            .map(|i| ExcludedIdea {
                name: i.name,
                description: i.description,
            })
            .collect();
        h.service.process(&response.submission_id, &exclusions).await;

        let detail = h.service.get(&response.submission_id, "u1").await.unwrap();
        assert_eq!(detail.submission.status, SubmissionStatus::Completed);
        let names: Vec<&str> = detail.ideas.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Denim Lamp"]);
        assert_eq!(generator.seen_exclusions.lock().unwrap()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_reanalysis_queues_exclusions_from_matching_submissions() {
        let generator = ScriptedGenerator::returning(vec!["Denim Lamp"]);
        let Harness {
            db,
            service,
            _jobs: jobs,
        } = harness(generator.clone()).await;
        db.create_completed_submission("s1", "u1", 2, "EcoBrick")
            .await
            .unwrap();
        db.create_completed_submission("s2", "u1", 1, "Felt Tile")
            .await
            .unwrap();
        db.create_completed_submission("s3", "u1", 1, "Metal Sign")
            .await
            .unwrap();
        submission::ActiveModel {
            id: Set("s3".to_string()),
            material: Set("Scrap metal".to_string()),
            ..Default::default()
        }
        .update(db.conn.as_ref())
        .await
        .unwrap();

        let _worker = jobs.start(JobWorkerContext {
            submissions: Some(service.clone()),
            notifications: Arc::new(NoOpNotificationSink),
            report_digest: None,
        });

        let response = service.reanalyze("s2", "u1").await.unwrap();
        assert_eq!(response.excluded_count, Some(3));

        let mut status = SubmissionStatus::Processing;
        for _ in 0..100 {
            status = service
                .get_status(&response.submission_id, "u1")
                .await
                .unwrap()
                .status;
            if status != SubmissionStatus::Processing {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, SubmissionStatus::Completed);

        let seen = generator.seen_exclusions.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        let mut names: Vec<String> = seen[0].iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["EcoBrick 0", "EcoBrick 1", "Felt Tile 0"]);
    }

    #[tokio::test]
    async fn test_reanalysis_with_only_repeats_fails() {
        let h = harness(ScriptedGenerator::returning(vec!["EcoBrick Panels"])).await;
        h.db
            .create_completed_submission("s1", "u1", 1, "EcoBrick Panels")
            .await
            .unwrap();

        let response = h.service.reanalyze("s1", "u1").await.unwrap();
        let exclusions = vec![ExcludedIdea {
            name: "EcoBrick Panels 0".to_string(),
            description: String::new(),
        }];
        h.service.process(&response.submission_id, &exclusions).await;

        let status = h.service.get_status(&response.submission_id, "u1").await.unwrap();
        assert_eq!(status.status, SubmissionStatus::Failed);
        assert_eq!(status.error_message.as_deref(), Some(NO_NOVEL_IDEAS));
    }

    #[tokio::test]
    async fn test_delete_refused_while_processing() {
        let h = harness(ScriptedGenerator::returning(vec!["A"])).await;
        let response = h.service.submit("u1", textile_input()).await.unwrap();

        let result = h.service.delete(&response.submission_id, "u1").await;
        assert!(matches!(result, Err(AppError::Precondition { .. })));

        h.service.process(&response.submission_id, &[]).await;
        h.service.delete(&response.submission_id, "u1").await.unwrap();
        let result = h.service.get(&response.submission_id, "u1").await;
        assert!(matches!(result, Err(AppError::SubmissionNotFound(_))));
    }

    #[tokio::test]
    async fn test_restart_fails_orphaned_submission() {
        let h = harness(ScriptedGenerator::returning(vec!["A"])).await;
        let orphan = h.service.submit("u1", textile_input()).await.unwrap();

        // A new process on the same database; the old queue is gone
        let jobs = JobService::default();
        let restarted = SubmissionService::new(
            SubmissionRepository::new(h.db.connection()),
            ScriptedGenerator::returning(vec!["B"]),
            ImageProviderChain::with_providers(vec![], &fast_config()),
            jobs.sender(),
        );
        let mut other = textile_input();
        other.material = "Scrap metal".to_string();
        assert!(matches!(
            restarted.submit("u1", other.clone()).await,
            Err(AppError::SubmissionInFlight { .. })
        ));

        assert_eq!(restarted.fail_interrupted().await.unwrap(), 1);

        let status = restarted.get_status(&orphan.submission_id, "u1").await.unwrap();
        assert_eq!(status.status, SubmissionStatus::Failed);
        assert_eq!(status.error_message.as_deref(), Some(INTERRUPTED));

        restarted.delete(&orphan.submission_id, "u1").await.unwrap();
        let response = restarted.submit("u1", other).await.unwrap();
        assert_eq!(response.status, SubmissionStatus::Processing);
    }

    #[tokio::test]
    async fn test_other_users_submission_is_not_found() {
        let h = harness(ScriptedGenerator::returning(vec!["A"])).await;
        h.db.create_user("u2").await.unwrap();
        h.db
            .create_completed_submission("s1", "u1", 1, "Idea")
            .await
            .unwrap();

        let result = h.service.get_status("s1", "u2").await;
        assert!(matches!(result, Err(AppError::SubmissionNotFound(_))));
    }

    #[tokio::test]
    async fn test_history_and_stats() {
        let h = harness(ScriptedGenerator::returning(vec!["A"])).await;
        h.db
            .create_completed_submission("s1", "u1", 2, "Idea")
            .await
            .unwrap();
        h.db
            .create_completed_submission("s2", "u1", 1, "Other")
            .await
            .unwrap();

        let page = h.service.history("u1", 1, 10).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(
            page.submissions.iter().map(|s| s.ideas.len()).sum::<usize>(),
            3
        );

        let stats = h.service.stats("u1").await.unwrap();
        assert_eq!(stats.total_submissions, 2);
        assert_eq!(stats.total_ideas, 3);
        assert_eq!(stats.industries, vec!["Textile Manufacturing".to_string()]);
    }
}
