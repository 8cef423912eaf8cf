//! Prometheus metrics exposition
//!
//! - `gateway_requests_total` (counter): labels `route`, `status`
//! - `gateway_request_duration_seconds` (histogram): label `route`
//! - `gateway_upstream_errors_total` (counter): labels `route`, `error_type`
//! - `gateway_token_refresh_total` (counter, recorded by `qbo-session`): label `outcome`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries from 5ms to 30s, the upstream timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("gateway_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Handle backed by a recorder that is not installed globally.
#[cfg(test)]
pub fn detached_handle() -> PrometheusHandle {
    builder().unwrap().build_recorder().handle()
}

/// Record a completed gateway request.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!("gateway_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route)
        .record(duration_secs);
}

/// Record a failed upstream call with a classification label.
pub fn record_upstream_error(route: &'static str, error_type: &'static str) {
    metrics::counter!("gateway_upstream_errors_total", "route" => route, "error_type" => error_type)
        .increment(1);
}
