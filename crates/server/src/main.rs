//! Upcycle-rs server entry point.

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upcycle_api::{AppState, middleware::auth_middleware, router as api_router};
use upcycle_common::Config;
use upcycle_core::{
    ChatCompletionsGenerator, ImageProviderChain, JobSender, JobService, JobWorkerContext,
    ModerationService, Notifier, ProductService, ReportDigestService, SubmissionService,
    sink_from_config,
};
use upcycle_db::repositories::{
    ModerationRepository, ProductRepository, ReportRepository, SubmissionRepository,
    UserRepository,
};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Enqueue the report digest every `interval`. The first run happens one
/// interval after startup.
fn spawn_report_digest(jobs: JobSender, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = jobs.report_digest().await {
                warn!(error = %e, "Report digest scheduler stopped");
                break;
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upcycle=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting upcycle-rs server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = upcycle_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    upcycle_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let db = Arc::new(db);
    let user_repo = UserRepository::new(Arc::clone(&db));
    let submission_repo = SubmissionRepository::new(Arc::clone(&db));
    let product_repo = ProductRepository::new(Arc::clone(&db));
    let report_repo = ReportRepository::new(Arc::clone(&db));
    let moderation_repo = ModerationRepository::new(Arc::clone(&db));

    // External collaborators
    let generator = Arc::new(ChatCompletionsGenerator::new(config.generation.clone())?);
    if config.generation.api_key.is_none() {
        warn!("No generation API key configured, every submission will fail");
    }
    let images = ImageProviderChain::from_config(&config.images)?;
    info!(providers = images.provider_count(), "Image provider chain ready");
    let notification_sink = sink_from_config(&config.notifications)?;

    // Background jobs
    let job_service = JobService::new(config.jobs.max_workers);
    let job_sender = job_service.sender();
    let notifier = Notifier::queued(job_sender.clone());

    // Initialize services
    let submission_service = SubmissionService::new(
        submission_repo.clone(),
        generator,
        images,
        job_sender.clone(),
    );
    let product_service = ProductService::new(
        product_repo.clone(),
        submission_repo,
        report_repo.clone(),
        notifier.clone(),
    );
    let moderation_service = ModerationService::new(
        moderation_repo,
        product_repo.clone(),
        user_repo.clone(),
        report_repo.clone(),
        notifier,
    );
    let report_digest_service = ReportDigestService::new(report_repo, product_repo);

    // Queued jobs did not survive the last shutdown
    submission_service.fail_interrupted().await?;

    let _job_handle = job_service.start(JobWorkerContext {
        submissions: Some(submission_service.clone()),
        notifications: notification_sink,
        report_digest: Some(report_digest_service),
    });
    info!("Job worker started");

    if config.jobs.report_digest_interval_secs > 0 {
        spawn_report_digest(
            job_sender,
            Duration::from_secs(config.jobs.report_digest_interval_secs),
        );
        info!(
            interval_secs = config.jobs.report_digest_interval_secs,
            "Report digest scheduled"
        );
    }

    // Create app state
    let state = AppState {
        user_repo,
        submission_service,
        product_service,
        moderation_service,
    };

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
