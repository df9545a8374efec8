//! Server-Sent Events for submission status.
//!
//! The stream opens with the current status and, while the submission is
//! still processing, closes after the first terminal event for it. Polling
//! `GET /status/{id}` stays the primary contract.

#![allow(missing_docs)]

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{
    StreamExt,
    stream::{self, Stream},
};
use serde::Serialize;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, warn};
use upcycle_common::AppResult;
use upcycle_core::{SubmissionEvent, SubmissionService};

use crate::{extractors::AuthUser, middleware::AppState};

const STATUS_EVENT: &str = "status";

fn status_event<T: Serialize>(payload: &T) -> Event {
    Event::default()
        .event(STATUS_EVENT)
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event(STATUS_EVENT).data("error"))
}

/// The terminal event to send for one broadcast item, if any.
///
/// A lagged receiver may have skipped the event it waits for, so the status
/// is read again and sent if it is terminal.
async fn terminal_update(
    service: &SubmissionService,
    submission_id: &str,
    user_id: &str,
    item: Result<SubmissionEvent, BroadcastStreamRecvError>,
) -> Option<Event> {
    match item {
        Ok(event) if event.submission_id == submission_id => Some(status_event(&event)),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            debug!(
                submission_id = %submission_id,
                skipped,
                "Status stream lagged, re-reading status"
            );
            match service.get_status(submission_id, user_id).await {
                Ok(view) if view.status.is_terminal() => Some(status_event(&view)),
                Ok(_) => None,
                Err(e) => {
                    warn!(submission_id = %submission_id, error = %e, "Failed to re-read status");
                    None
                }
            }
        }
    }
}

/// Status stream for one of the caller's submissions.
pub async fn submission_status(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before reading so a completion in between is not missed
    let rx = state.submission_service.subscribe();
    let view = state
        .submission_service
        .get_status(&submission_id, &user.id)
        .await?;

    let remaining = usize::from(!view.status.is_terminal());
    let initial = stream::once(async move { status_event(&view) });

    let service = state.submission_service;
    let user_id = user.id;
    let updates = BroadcastStream::new(rx)
        .filter_map(move |item| {
            let service = service.clone();
            let submission_id = submission_id.clone();
            let user_id = user_id.clone();
            async move { terminal_update(&service, &submission_id, &user_id, item).await }
        })
        .take(remaining);

    let events = initial.chain(updates).map(Ok::<_, Infallible>);

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sea_orm::Set;
    use std::sync::Arc;
    use upcycle_common::{AppError, config::ImageConfig};
    use upcycle_core::{
        ExcludedIdea, GeneratedIdea, IdeaGenerator, ImageProviderChain, JobService, WasteInput,
    };
    use upcycle_db::entities::submission::{self, SubmissionStatus};
    use upcycle_db::repositories::SubmissionRepository;
    use upcycle_db::test_utils::TestDatabase;

    struct UnusedGenerator;

    #[async_trait]
    impl IdeaGenerator for UnusedGenerator {
        async fn generate(
            &self,
            _input: &WasteInput,
            _exclusions: &[ExcludedIdea],
        ) -> AppResult<Vec<GeneratedIdea>> {
            Err(AppError::ExternalService("not used".to_string()))
        }
    }

    async fn service(db: &TestDatabase) -> (SubmissionService, JobService) {
        let jobs = JobService::default();
        let service = SubmissionService::new(
            SubmissionRepository::new(db.connection()),
            Arc::new(UnusedGenerator),
            ImageProviderChain::with_providers(Vec::new(), &ImageConfig::default()),
            jobs.sender(),
        );
        (service, jobs)
    }

    fn event_for(submission_id: &str) -> SubmissionEvent {
        SubmissionEvent {
            submission_id: submission_id.to_string(),
            user_id: "u1".to_string(),
            status: SubmissionStatus::Completed,
            ideas_count: 1,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_only_own_submission_events_pass() {
        let db = TestDatabase::new().await.unwrap();
        db.create_user("u1").await.unwrap();
        let (service, _jobs) = service(&db).await;

        assert!(terminal_update(&service, "s1", "u1", Ok(event_for("s1"))).await.is_some());
        assert!(terminal_update(&service, "s1", "u1", Ok(event_for("s2"))).await.is_none());
    }

    #[tokio::test]
    async fn test_lagged_stream_recovers_terminal_status() {
        let db = TestDatabase::new().await.unwrap();
        db.create_user("u1").await.unwrap();
        db.create_completed_submission("done", "u1", 1, "Panel")
            .await
            .unwrap();
        let (service, _jobs) = service(&db).await;

        let update =
            terminal_update(&service, "done", "u1", Err(BroadcastStreamRecvError::Lagged(300)))
                .await;
        assert!(update.is_some());
    }

    #[tokio::test]
    async fn test_lagged_stream_keeps_waiting_while_processing() {
        let db = TestDatabase::new().await.unwrap();
        db.create_user("u1").await.unwrap();
        SubmissionRepository::new(db.connection())
            .create(submission::ActiveModel {
                id: Set("running".to_string()),
                user_id: Set("u1".to_string()),
                material: Set("Wood offcuts".to_string()),
                quantity: Set("2 tons/week".to_string()),
                properties: Set(serde_json::json!([])),
                industry: Set("Furniture".to_string()),
                status: Set(SubmissionStatus::Processing),
                error_message: Set(None),
                created_at: Set(Utc::now().into()),
                completed_at: Set(None),
            })
            .await
            .unwrap();
        let (service, _jobs) = service(&db).await;

        let update =
            terminal_update(&service, "running", "u1", Err(BroadcastStreamRecvError::Lagged(3)))
                .await;
        assert!(update.is_none());
    }
}
