//! Request timing and delay-gate metrics
//!
//! Everything goes through the `metrics` facade; without an installed
//! recorder the calls are no-ops. The Prometheus recorder is installed by
//! the server when the `metrics` feature is enabled.

use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};

/// Histogram of handler latency, labelled by route and status
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";
/// Delays that obtained a slot
pub const DELAY_ADMITTED: &str = "delay_gate_admitted_total";
/// Delays turned away, labelled by reason
pub const DELAY_REJECTED: &str = "delay_gate_rejected_total";
/// Slots currently held
pub const DELAY_IN_FLIGHT: &str = "delay_gate_in_flight";

#[allow(clippy::cast_precision_loss)]
fn set_in_flight(in_flight: usize) {
    telemetry_metrics::gauge!(DELAY_IN_FLIGHT).set(in_flight as f64);
}

pub(crate) fn record_delay_admitted(in_flight: usize) {
    telemetry_metrics::counter!(DELAY_ADMITTED).increment(1);
    set_in_flight(in_flight);
}

pub(crate) fn record_delay_released(in_flight: usize) {
    set_in_flight(in_flight);
}

pub(crate) fn record_delay_rejected(reason: &'static str) {
    telemetry_metrics::counter!(DELAY_REJECTED, "reason" => reason).increment(1);
}

fn record_request(route: String, status: u16, elapsed: Duration) {
    telemetry_metrics::histogram!(
        REQUEST_DURATION,
        "route" => route,
        "status" => status.to_string()
    )
    .record(elapsed.as_secs_f64());
}

/// Middleware timing every matched route
pub async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_owned(), |p| p.as_str().to_owned());

    let start = Instant::now();
    let response = next.run(request).await;
    record_request(route, response.status().as_u16(), start.elapsed());
    response
}

/// Install the process-wide Prometheus recorder
#[cfg(feature = "metrics")]
pub fn install_prometheus() -> crate::Result<metrics_exporter_prometheus::PrometheusHandle> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| crate::Error::Internal(format!("Failed to install metrics recorder: {e}")))
}
