// HTTP API for PromptGate
//
// Routes:
// - POST /v1/sessions                    create a session id
// - POST /v1/sessions/{id}/generate      rate-limited generation
// - GET  /v1/sessions/{id}/quota         dry-run quota check
// - GET  /v1/sessions/{id}/history       recent decisions for one session
// - POST /v1/sessions/{id}/unblock       admin unblock
// - GET  /v1/admin/dashboard             usage snapshot
// - POST /v1/admin/actions               admin actions
// - GET  /metrics                        Prometheus scrape endpoint
// - GET  /health                         liveness

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::metrics;
use crate::rate_limit::{AdminAction, Clock, DashboardBuilder, RateLimiter, SessionId};
use crate::service::{GenerateRequest, GenerationService};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: GenerationService,
}

impl AppState {
    pub fn new(service: GenerationService) -> Self {
        Self { service }
    }
}

/// Service errors mapped onto HTTP responses
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            ServiceError::RateLimited {
                seconds_remaining,
                message,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, seconds_remaining.to_string())],
                Json(serde_json::json!({
                    "error": message,
                    "retry_after_secs": seconds_remaining,
                })),
            )
                .into_response(),
            err @ (ServiceError::EmptyPrompt | ServiceError::PromptTooLong { .. }) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response(),
            ServiceError::Generation(err) => (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response(),
        }
    }
}

/// Build the API router
pub fn router(state: AppState, expose_metrics: bool) -> Router {
    let mut app = Router::new()
        .route("/v1/sessions", post(create_session_handler))
        .route("/v1/sessions/{id}/generate", post(generate_handler))
        .route("/v1/sessions/{id}/quota", get(quota_handler))
        .route("/v1/sessions/{id}/history", get(history_handler))
        .route("/v1/sessions/{id}/unblock", post(unblock_handler))
        .route("/v1/admin/dashboard", get(dashboard_handler))
        .route("/v1/admin/actions", post(admin_action_handler))
        .route("/health", get(health_handler));

    if expose_metrics {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Run the API on `config.host:config.port` until Ctrl-C
pub async fn serve(
    config: &ServerConfig,
    service: GenerationService,
    expose_metrics: bool,
) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;

    let janitor = spawn_janitor(
        service.limiter().clone(),
        service.clock().clone(),
        Duration::from_secs(config.purge_interval_secs),
        TimeDelta::seconds(config.session_idle_ttl_secs.min(i64::MAX as u64) as i64),
    );

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!(
        "Starting API server on {}",
        listener.local_addr().context("Failed to read bound address")?
    );

    let app = router(AppState::new(service), expose_metrics);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error");

    janitor.abort();
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Periodically drop sessions idle for longer than `ttl`
pub fn spawn_janitor(
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    every: Duration,
    ttl: TimeDelta,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.purge_idle(clock.now(), ttl).await;
        }
    })
}

async fn create_session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let id = SessionId::generate();
    let now = state.service.clock().now();
    state
        .service
        .limiter()
        .store()
        .get_or_create(&id, now)
        .await;
    info!(session_id = %id, "Session created");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "session_id": id })),
    )
}

async fn generate_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    let session = SessionId::new(id);
    let response = state.service.generate(&session, request).await?;
    Ok(Json(response).into_response())
}

async fn quota_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    Json(state.service.quota(&SessionId::new(id)).await).into_response()
}

async fn history_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let session = SessionId::new(id);
    Json(state.service.limiter().get_usage_history(&session).await).into_response()
}

async fn unblock_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let session = SessionId::new(id);
    let unblocked = state.service.limiter().unblock(&session).await;
    info!(session_id = %session, unblocked, "Admin unblock");
    Json(serde_json::json!({ "unblocked": unblocked })).into_response()
}

async fn dashboard_handler(State(state): State<AppState>) -> Response {
    let now = state.service.clock().now();
    let data = DashboardBuilder::new(state.service.limiter().clone())
        .build(now)
        .await;
    Json(data).into_response()
}

async fn admin_action_handler(
    State(state): State<AppState>,
    Json(action): Json<AdminAction>,
) -> Response {
    let now = state.service.clock().now();
    match action.execute(state.service.limiter(), now).await {
        Ok(outcome) => {
            info!(?outcome, "Admin action executed");
            Json(outcome).into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("{:#}", e) })),
        )
            .into_response(),
    }
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{ManualClock, RateLimitConfig};
    use chrono::{DateTime, Utc};

    #[tokio::test]
    async fn test_janitor_purges_idle_sessions() {
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let limiter = RateLimiter::new(RateLimitConfig::default());
        limiter
            .check_and_consume(&SessionId::new("idle"), start)
            .await;

        clock.advance(TimeDelta::hours(2));
        let janitor = spawn_janitor(
            limiter.clone(),
            clock.clone(),
            Duration::from_millis(10),
            TimeDelta::hours(1),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        janitor.abort();

        assert_eq!(limiter.store().count().await, 0);
    }

    #[test]
    fn test_rate_limited_response() {
        let response = ApiError(ServiceError::RateLimited {
            seconds_remaining: 42,
            message: "slow down".to_string(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let response = ApiError(ServiceError::EmptyPrompt).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
