// HTTP server for the Encore gateway
//
// Every API route passes through the rate limit middleware. Operator routes
// live under /api/admin/rate-limit and are therefore gated as `admin`.
// /health and /metrics sit outside the gate.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderName, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::metrics;
use crate::rate_limit::middleware::ApiErrorResponse;
use crate::rate_limit::{rate_limit_middleware, BucketRegistry, DashboardData, RateLimitGate};

/// Header operator requests authenticate with
pub const X_ADMIN_TOKEN: HeaderName = HeaderName::from_static("x-admin-token");

/// Shared state for handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Rate limit gate (owns the bucket registry)
    pub gate: Arc<RateLimitGate>,

    /// Token operator routes require; operator routes are closed when unset
    pub admin_token: Option<String>,

    /// Whether /metrics is mounted
    pub metrics_enabled: bool,
}

impl AppState {
    /// Build the state from configuration with a fresh registry
    pub fn from_config(config: &Config) -> Self {
        let registry = Arc::new(BucketRegistry::new());
        Self {
            gate: Arc::new(RateLimitGate::new(config.rate_limit.clone(), registry)),
            admin_token: config.rate_limit.admin_token.clone(),
            metrics_enabled: config.metrics.enabled,
        }
    }
}

/// Build the application router.
///
/// `downstream` holds the business routes; they run behind the gate.
pub fn app(state: AppState, downstream: Router) -> Router {
    let operator = Router::new()
        .route(
            "/api/admin/rate-limit/reset/{identifier}",
            post(reset_handler),
        )
        .route("/api/admin/rate-limit/buckets", get(buckets_handler))
        .with_state(state.clone());

    let gated = operator.merge(downstream).layer(middleware::from_fn_with_state(
        Arc::clone(&state.gate),
        rate_limit_middleware,
    ));

    let mut router: Router<AppState> = Router::new().route("/health", get(health_handler));
    if state.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .with_state(state)
        .merge(gated)
        .layer(TraceLayer::new_for_http())
}

/// Downstream used when no business routes are mounted
pub fn unmounted_downstream() -> Router {
    Router::new().fallback(not_found_handler)
}

/// Start the gateway and serve until Ctrl-C
pub async fn serve(config: &Config) -> Result<()> {
    if config.metrics.enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let state = AppState::from_config(config);
    if state.admin_token.is_none() {
        warn!("No admin token configured; operator routes will refuse all requests");
    }

    let app = app(state, unmounted_downstream());
    let addr = config.server.socket_addr()?;

    info!("Starting gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind gateway")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Gateway server error")?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let presented = headers.get(&X_ADMIN_TOKEN).and_then(|v| v.to_str().ok());
    match (state.admin_token.as_deref(), presented) {
        (Some(expected), Some(presented)) if expected == presented => Ok(()),
        _ => Err((StatusCode::FORBIDDEN, "Forbidden").into_response()),
    }
}

/// Operator reset: drop the bucket for `identifier`
async fn reset_handler(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    state.gate.reset(&identifier);
    metrics::RATE_LIMIT_RESETS_TOTAL.inc();

    (
        StatusCode::OK,
        format!("Rate limit reset for: {}", identifier),
    )
        .into_response()
}

/// Operator dashboard: snapshot of live buckets
async fn buckets_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    Json(DashboardData::collect(&state.gate)).into_response()
}

/// Metrics endpoint handler. Samples the live bucket gauge at scrape time.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    metrics::RATE_LIMIT_ACTIVE_BUCKETS.set(state.gate.registry().len() as i64);
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

async fn not_found_handler() -> Response {
    let body = ApiErrorResponse {
        success: false,
        error: "NOT_FOUND".to_string(),
        message: "No downstream service is mounted for this route.".to_string(),
        timestamp: chrono::Utc::now(),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
