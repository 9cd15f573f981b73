pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use reqwest::Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::database::{
    assignment_repo::AssignmentRepository, progress_repo::PgProgressStore,
    submission_repo::PgSubmissionRepository,
};
use crate::error::Result;
use crate::middleware::{auth, rate_limit};
use crate::services::{
    analysis_service::{AnalysisRelay, HttpAudioAnalyzer},
    notification_service::ToastCenter,
    practice_session_service::PracticeSessionService,
    room_token_service::RoomTokenService,
    submission_service::{SubmissionRepository, SubmissionService},
};

#[derive(Clone)]
pub struct AppState {
    pub assignments: AssignmentRepository,
    pub progress: PgProgressStore,
    pub submission_repo: Arc<dyn SubmissionRepository>,
    pub sessions: PracticeSessionService,
    pub submissions: SubmissionService,
    pub toasts: ToastCenter,
    pub relay: AnalysisRelay,
    pub room_tokens: Option<RoomTokenService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        let progress = PgProgressStore::new(pool.clone());
        let submission_repo: Arc<dyn SubmissionRepository> =
            Arc::new(PgSubmissionRepository::new(pool.clone()));
        let toasts = ToastCenter::new();
        let analyzer = HttpAudioAnalyzer::new(http_client.clone(), config.submit_audio_url.clone());

        let sessions = PracticeSessionService::new(Arc::new(progress.clone()));
        let submissions = SubmissionService::new(
            submission_repo.clone(),
            Arc::new(analyzer),
            Arc::new(toasts.clone()),
        );
        let relay = AnalysisRelay::new(http_client, config.analysis_backend_url.clone());
        let room_tokens = config.livekit.clone().map(RoomTokenService::new);
        if room_tokens.is_none() {
            tracing::warn!("LiveKit settings missing; connection details will be unavailable");
        }

        Ok(Self {
            assignments: AssignmentRepository::new(pool),
            progress,
            submission_repo,
            sessions,
            submissions,
            toasts,
            relay,
            room_tokens,
        })
    }
}

/// Every route of the service, without the outer trace/CORS layers.
pub fn app(state: AppState, public_rps: u32) -> Router {
    let practice_api = Router::new()
        .route("/api/practice/sessions", post(routes::practice::create_session))
        .route(
            "/api/practice/sessions/:id",
            get(routes::practice::get_session).delete(routes::practice::close_session),
        )
        .route(
            "/api/practice/sessions/:id/prep/start",
            post(routes::practice::start_prep),
        )
        .route(
            "/api/practice/sessions/:id/recording/start",
            post(routes::practice::start_recording),
        )
        .route(
            "/api/practice/sessions/:id/timers/reset",
            post(routes::practice::reset_timers),
        )
        .route(
            "/api/practice/sessions/:id/navigate",
            post(routes::practice::navigate),
        )
        .route(
            "/api/practice/sessions/:id/complete",
            post(routes::practice::complete_question),
        )
        .route(
            "/api/assignments/:id/recordings/:question_id",
            put(routes::submission::upload_recording),
        )
        .route(
            "/api/assignments/:id/attempts",
            post(routes::submission::start_new_attempt),
        )
        .route(
            "/api/notifications",
            get(routes::notifications::list_notifications),
        )
        .layer(axum::middleware::from_fn(auth::require_bearer_auth));

    let submission_api = Router::new()
        .route(
            "/api/assignments/:id/submit",
            post(routes::submission::submit_assignment),
        )
        .layer(axum::middleware::from_fn(auth::optional_bearer_auth));

    let public_api = Router::new()
        .route("/api/submit-audio", post(routes::relay::submit_audio))
        .route(
            "/api/connection-details",
            get(routes::relay::connection_details),
        )
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::RateLimiter::new(public_rps),
            rate_limit::rps_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(practice_api)
        .merge(submission_api)
        .merge(public_api)
        .with_state(state)
}
