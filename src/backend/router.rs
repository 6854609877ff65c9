//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, Uri, header},
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::debug;

use crate::builder::{self, CookieRequest};
use crate::failsafe::DelayGate;
use crate::metrics::track_requests;
use crate::response::ResponseDescription;
use crate::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Admission gate for simulated delays
    pub gate: Arc<DelayGate>,
    /// Whether `X-Forwarded-Proto` decides the cookie's `Secure` flag
    pub trust_forwarded_proto: bool,
    /// Prometheus exposition handle
    #[cfg(feature = "metrics")]
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl AppState {
    /// State around an existing gate, without a metrics exporter
    #[must_use]
    pub fn new(gate: Arc<DelayGate>, trust_forwarded_proto: bool) -> Self {
        Self {
            gate,
            trust_forwarded_proto,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidParameter(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidParameter(rejection.body_text())
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/force-cache/default", get(force_cache_handler))
        .route("/api/force-no-cache/default", get(force_no_cache_handler))
        .route("/api/max-age-header", get(max_age_query_handler))
        .route("/api/max-age-header/{age}", get(max_age_path_handler))
        .route(
            "/api/max-age-header/{age}/status/{status}/timing/{time}",
            get(max_age_status_timing_handler),
        )
        .route("/api/status/{status}", get(status_handler))
        .route("/api/status/{status}/timing/{time}", get(status_timing_handler))
        .route("/api/timing/{time}", get(timing_handler))
        .route(
            "/api/cookie/cache/{name}/{value}/max-age-header/{age}",
            get(cookie_handler),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_requests))
        .fallback(not_found_handler)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query string of `GET /api/max-age-header`
#[derive(Debug, Deserialize)]
struct AgeQuery {
    age: i64,
}

/// Only codes an HTTP response can carry are accepted
fn checked_status(status: i32) -> Result<i32> {
    if (100..=999).contains(&status) {
        Ok(status)
    } else {
        Err(Error::InvalidParameter(format!(
            "status must be between 100 and 999, got {status}"
        )))
    }
}

/// RFC 6265 token: visible ASCII minus separators
fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}

/// RFC 6265 cookie-octets (may be empty)
fn is_cookie_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_graphic() && !matches!(b, b'"' | b',' | b';' | b'\\'))
}

/// Decoded path segments are rendered into `Set-Cookie` as-is
fn checked_cookie(name: &str, value: &str) -> Result<()> {
    if !is_cookie_name(name) {
        return Err(Error::InvalidParameter(format!(
            "cookie name {name:?} is not a valid token"
        )));
    }
    if !is_cookie_value(value) {
        return Err(Error::InvalidParameter(format!(
            "cookie value {value:?} contains characters not allowed in a cookie"
        )));
    }
    Ok(())
}

async fn force_cache_handler() -> ResponseDescription {
    builder::build_cacheable(0)
}

async fn force_no_cache_handler() -> ResponseDescription {
    builder::build_cacheable(100)
}

async fn max_age_path_handler(
    age: std::result::Result<Path<i64>, PathRejection>,
) -> Result<ResponseDescription> {
    let Path(age) = age?;
    Ok(builder::build_max_age(age))
}

async fn max_age_query_handler(
    query: std::result::Result<Query<AgeQuery>, QueryRejection>,
) -> Result<ResponseDescription> {
    let Query(AgeQuery { age }) = query?;
    Ok(builder::build_max_age(age))
}

async fn status_handler(
    status: std::result::Result<Path<i32>, PathRejection>,
) -> Result<ResponseDescription> {
    let Path(status) = status?;
    Ok(builder::build_status(checked_status(status)?))
}

async fn timing_handler(
    State(state): State<Arc<AppState>>,
    time: std::result::Result<Path<i64>, PathRejection>,
) -> Result<ResponseDescription> {
    let Path(time) = time?;
    debug!(time, "Timed response requested");
    builder::build_timed_ok(&state.gate, time).await
}

async fn status_timing_handler(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Path<(i32, i64)>, PathRejection>,
) -> Result<ResponseDescription> {
    let Path((status, time)) = params?;
    let status = checked_status(status)?;
    debug!(status, time, "Timed status response requested");
    builder::build_status_with_delay(&state.gate, status, time).await
}

async fn max_age_status_timing_handler(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Path<(i64, i32, i64)>, PathRejection>,
) -> Result<ResponseDescription> {
    let Path((age, status, time)) = params?;
    let status = checked_status(status)?;
    debug!(age, status, time, "Timed max-age response requested");
    builder::build_max_age_status_timed(&state.gate, age, status, time).await
}

async fn cookie_handler(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    params: std::result::Result<Path<(String, String, i64)>, PathRejection>,
) -> Result<ResponseDescription> {
    let Path((name, value, max_age)) = params?;
    checked_cookie(&name, &value)?;

    let request = CookieRequest {
        incoming_value: request_cookie(&headers, &name),
        scheme: request_scheme(&headers, &uri, state.trust_forwarded_proto),
        host: request_host(&headers, &uri),
        name,
        value,
        max_age,
    };
    debug!(
        cookie = %request.name,
        scheme = %request.scheme,
        host = %request.host,
        had_cookie = request.incoming_value.is_some(),
        "Cookie response requested"
    );

    Ok(builder::build_cookie(&request))
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "delay_gate": {
            "capacity": state.gate.capacity(),
            "available": state.gate.available(),
            "in_flight": state.gate.in_flight(),
            "rejected_total": state.gate.rejected_total(),
        }
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(not(feature = "metrics"))]
async fn metrics_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "built without the metrics feature")
}

async fn not_found_handler(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": format!("No route for {}", uri.path()),
            "status": StatusCode::NOT_FOUND.as_u16(),
        })),
    )
}

/// Scheme the client used to reach us (or the TLS-terminating proxy in front)
fn request_scheme(headers: &HeaderMap, uri: &Uri, trust_forwarded: bool) -> String {
    let forwarded = trust_forwarded
        .then(|| headers.get("x-forwarded-proto"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| uri.scheme_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| "http".to_string())
}

/// Request host without port
fn request_host(headers: &HeaderMap, uri: &Uri) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_port)
        .or_else(|| uri.host())
        .unwrap_or_default()
        .to_string()
}

fn strip_port(authority: &str) -> &str {
    if authority.starts_with('[') {
        // IPv6 literal
        return authority
            .find(']')
            .map_or(authority, |end| &authority[..=end]);
    }
    authority.split(':').next().unwrap_or(authority)
}

/// First value of the named cookie across all `Cookie` headers
fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}
