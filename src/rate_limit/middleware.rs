//! HTTP Middleware
//!
//! Runs every inbound request through the gate before it reaches a
//! handler, and renders denied decisions as HTTP 429.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use super::gate::{Decision, RateLimitGate};
use super::identity::RequestMeta;
use crate::metrics;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Error code carried in every rejection body
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

/// Structured error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A denied request, ready to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    /// Seconds until capacity is expected back
    pub retry_after_secs: u64,

    /// Bucket capacity
    pub limit: u64,
}

impl RateLimitRejection {
    pub fn from_decision(decision: &Decision) -> Self {
        Self {
            retry_after_secs: decision.retry_after_secs,
            limit: decision.limit,
        }
    }

    fn message(&self) -> String {
        format!(
            "Rate limit exceeded. Please try again after {} seconds.",
            self.retry_after_secs
        )
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let now = Utc::now();
        let reset_at_ms = now
            .timestamp_millis()
            .saturating_add(i64::try_from(self.retry_after_secs.saturating_mul(1000)).unwrap_or(i64::MAX));

        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after_secs));
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u64));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_at_ms));

        let body = ApiErrorResponse {
            success: false,
            error: RATE_LIMIT_EXCEEDED.to_string(),
            message: self.message(),
            timestamp: now,
        };

        (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response()
    }
}

/// Extract the rate limiter's inputs from an HTTP request.
///
/// Falls back to an empty peer address when `ConnectInfo` is missing
/// (e.g. in router tests), which resolves to `ip:unknown`.
pub fn request_meta(req: &Request) -> RequestMeta {
    let header_str = |name: &HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    RequestMeta {
        path: req.uri().path().to_string(),
        method: req.method().as_str().to_string(),
        authorization: header_str(&header::AUTHORIZATION),
        forwarded_for: header_str(&X_FORWARDED_FOR),
        remote_addr: req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0.ip().to_string())
            .unwrap_or_default(),
    }
}

/// Axum middleware that enforces per-client, per-category rate limits
pub async fn rate_limit_middleware(
    State(gate): State<Arc<RateLimitGate>>,
    req: Request,
    next: Next,
) -> Response {
    let meta = request_meta(&req);
    let decision = gate.admit(&meta);
    metrics::record_decision(&decision);

    if !decision.allowed {
        return RateLimitRejection::from_decision(&decision).into_response();
    }

    let mut response = next.run(req).await;
    if gate.is_enabled() {
        let headers = response.headers_mut();
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    }
    response
}
