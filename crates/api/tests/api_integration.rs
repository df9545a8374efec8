//! API integration tests.
//!
//! These tests drive the router end to end against an in-memory database,
//! with the job worker running and a scripted idea generator.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    middleware,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use upcycle_api::{AppState, middleware::auth_middleware, router as api_router};
use upcycle_common::AppResult;
use upcycle_common::config::ImageConfig;
use upcycle_core::{
    ExcludedIdea, GeneratedIdea, IdeaGenerator, ImageProviderChain, JobService, JobWorkerContext,
    ModerationService, NoOpNotificationSink, Notifier, ProductService, SubmissionService,
    WasteInput,
};
use upcycle_db::repositories::{
    ModerationRepository, ProductRepository, ReportRepository, SubmissionRepository,
    UserRepository,
};
use upcycle_db::test_utils::TestDatabase;

/// Generator returning three fixed ideas.
struct StubGenerator;

#[async_trait]
impl IdeaGenerator for StubGenerator {
    async fn generate(
        &self,
        _input: &WasteInput,
        _exclusions: &[ExcludedIdea],
    ) -> AppResult<Vec<GeneratedIdea>> {
        Ok(["Acoustic Panels", "Felt Tiles", "Insulation Batts"]
            .into_iter()
            .map(|name| GeneratedIdea {
                name: name.to_string(),
                description: format!("{name} made from recovered fibre"),
                target_market: "Construction".to_string(),
                visual_description: None,
                image_keywords: None,
                research_questions: Vec::new(),
                success_factors: Vec::new(),
            })
            .collect())
    }
}

struct TestApp {
    app: Router,
    _db: TestDatabase,
}

async fn test_app() -> TestApp {
    let db = TestDatabase::new().await.unwrap();
    db.create_user("u1").await.unwrap();
    db.create_user("u2").await.unwrap();
    db.create_admin("admin").await.unwrap();

    let conn = db.connection();
    let jobs = JobService::new(2);
    let sender = jobs.sender();
    let notifier = Notifier::queued(sender.clone());

    let images = ImageProviderChain::with_providers(
        Vec::new(),
        &ImageConfig {
            inter_idea_delay_ms: 0,
            ..ImageConfig::default()
        },
    );

    let submission_service = SubmissionService::new(
        SubmissionRepository::new(conn.clone()),
        Arc::new(StubGenerator),
        images,
        sender,
    );
    let product_service = ProductService::new(
        ProductRepository::new(conn.clone()),
        SubmissionRepository::new(conn.clone()),
        ReportRepository::new(conn.clone()),
        notifier.clone(),
    );
    let moderation_service = ModerationService::new(
        ModerationRepository::new(conn.clone()),
        ProductRepository::new(conn.clone()),
        UserRepository::new(conn.clone()),
        ReportRepository::new(conn.clone()),
        notifier,
    );

    jobs.start(JobWorkerContext {
        submissions: Some(submission_service.clone()),
        notifications: Arc::new(NoOpNotificationSink),
        report_digest: None,
    });

    let state = AppState {
        user_repo: UserRepository::new(conn),
        submission_service,
        product_service,
        moderation_service,
    };

    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);

    TestApp { app, _db: db }
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer token-{id}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Submit for `user` and wait until generation finishes.
    async fn completed_submission(&self, user: &str) -> String {
        let (status, body) = self
            .call("POST", "/api/waste/submit", Some(user), Some(waste()))
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["status"], "processing");
        let id = body["data"]["submissionId"].as_str().unwrap().to_string();

        for _ in 0..100 {
            let (_, body) = self
                .call("GET", &format!("/api/waste/status/{id}"), Some(user), None)
                .await;
            if body["data"]["status"] == "completed" {
                assert_eq!(body["data"]["hasResults"], true);
                assert_eq!(body["data"]["ideasCount"], 3);
                return id;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("submission {id} did not complete");
    }
}

fn waste() -> Value {
    json!({
        "material": "Cotton textile waste",
        "quantity": "15 tons/month",
        "properties": ["clean", "sorted"],
        "industry": "Textile Manufacturing"
    })
}

#[tokio::test]
async fn test_anonymous_submit_is_unauthorized() {
    let app = test_app().await;

    let (status, body) = app
        .call("POST", "/api/waste/submit", None, Some(waste()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app
        .call("POST", "/api/waste/submit", Some("nobody"), Some(waste()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_blank_material_is_rejected() {
    let app = test_app().await;

    let mut input = waste();
    input["material"] = json!("   ");
    let (status, body) = app
        .call("POST", "/api/waste/submit", Some("u1"), Some(input))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_duplicate_submission_points_at_existing() {
    let app = test_app().await;
    let id = app.completed_submission("u1").await;

    let (status, body) = app
        .call("POST", "/api/waste/submit", Some("u1"), Some(waste()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["id"], id.as_str());
}

#[tokio::test]
async fn test_submission_is_private_to_owner() {
    let app = test_app().await;
    let id = app.completed_submission("u1").await;

    let (status, _) = app
        .call("GET", &format!("/api/waste/{id}"), Some("u2"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call("GET", &format!("/api/waste/{id}"), Some("u1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ideas"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_publish_moderate_and_report_flow() {
    let app = test_app().await;
    let submission_id = app.completed_submission("u1").await;

    // Publish one idea
    let (status, body) = app
        .call(
            "POST",
            "/api/products/publish",
            Some("u1"),
            Some(json!({ "submissionId": submission_id, "ideaIndex": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending_verification");
    assert_eq!(body["data"]["name"], "Felt Tiles");
    let product_id = body["data"]["id"].as_str().unwrap().to_string();

    // Only one pending product per user
    let (status, body) = app
        .call(
            "POST",
            "/api/products/publish",
            Some("u1"),
            Some(json!({ "submissionId": submission_id, "ideaIndex": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["id"], product_id.as_str());

    // Not public yet
    let (_, body) = app.call("GET", "/api/products/public", None, None).await;
    assert_eq!(body["data"]["stats"]["total"], 0);
    let (status, _) = app
        .call("GET", &format!("/api/products/{product_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Approval verifies the owner
    let (status, body) = app
        .call(
            "POST",
            &format!("/api/admin/products/{product_id}/approve"),
            Some("admin"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ownerVerified"], true);
    assert_eq!(body["data"]["product"]["status"], "approved");

    let (_, body) = app.call("GET", "/api/products/public", None, None).await;
    assert_eq!(body["data"]["stats"]["total"], 1);
    assert_eq!(body["data"]["products"][0]["id"], product_id.as_str());

    // Public report, then a duplicate from the same address
    let report = json!({ "reporterEmail": "r@example.com", "reason": "misleading" });
    let (status, body) = app
        .call(
            "POST",
            &format!("/api/products/{product_id}/report"),
            None,
            Some(report.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let report_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            "POST",
            &format!("/api/products/{product_id}/report"),
            None,
            Some(report),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app
        .call("GET", "/api/admin/reports/pending", Some("admin"), None)
        .await;
    assert_eq!(body["data"][0]["productName"], "Felt Tiles");

    // Resolving with deactivation takes the product down
    let (status, body) = app
        .call(
            "POST",
            &format!("/api/admin/reports/{report_id}/resolve"),
            Some("admin"),
            Some(json!({ "action": "deactivate" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deactivatedProduct"]["status"], "deactivated");
    assert_eq!(
        body["data"]["deactivatedProduct"]["deactivationType"],
        "policy_violation"
    );

    let (_, body) = app.call("GET", "/api/products/public", None, None).await;
    assert_eq!(body["data"]["stats"]["total"], 0);

    let (_, body) = app.call("GET", "/api/admin/stats", Some("admin"), None).await;
    assert_eq!(body["data"]["products"]["deactivated"], 1);
    assert_eq!(body["data"]["pendingReports"], 0);
    assert_eq!(body["data"]["users"]["verified"], 1);
}

#[tokio::test]
async fn test_suspended_user_is_locked_out() {
    let app = test_app().await;
    let submission_id = app.completed_submission("u1").await;

    let (_, body) = app
        .call(
            "POST",
            "/api/products/publish",
            Some("u1"),
            Some(json!({ "submissionId": submission_id, "ideaIndex": 0 })),
        )
        .await;
    let product_id = body["data"]["id"].as_str().unwrap().to_string();
    app.call(
        "POST",
        &format!("/api/admin/products/{product_id}/approve"),
        Some("admin"),
        None,
    )
    .await;

    let (status, body) = app
        .call(
            "POST",
            "/api/admin/users/u1/suspend",
            Some("admin"),
            Some(json!({ "reason": "Fraudulent listings" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["affectedProducts"], 1);
    assert!(body["data"]["user"].get("token").is_none());

    let (status, body) = app.call("GET", "/api/waste/history", Some("u1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    // Reactivation restores the suspension-driven deactivation
    let (status, body) = app
        .call("POST", "/api/admin/users/u1/reactivate", Some("admin"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["affectedProducts"], 1);

    let (status, _) = app.call("GET", "/api/waste/history", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.call("GET", "/api/products/public", None, None).await;
    assert_eq!(body["data"]["stats"]["total"], 1);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = test_app().await;

    let (status, _) = app.call("GET", "/api/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call("GET", "/api/admin/stats", Some("u1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            "POST",
            "/api/admin/users/admin/suspend",
            Some("admin"),
            Some(json!({ "reason": "Testing" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_precondition_error_names_states() {
    let app = test_app().await;
    let submission_id = app.completed_submission("u1").await;

    let (_, body) = app
        .call(
            "POST",
            "/api/products/publish",
            Some("u1"),
            Some(json!({ "submissionId": submission_id, "ideaIndex": 0 })),
        )
        .await;
    let product_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/admin/products/{product_id}/reactivate"),
            Some("admin"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");
    assert_eq!(body["error"]["required"], "deactivated");
    assert_eq!(body["error"]["actual"], "pending_verification");
}
