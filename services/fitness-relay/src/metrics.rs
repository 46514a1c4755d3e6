//! Prometheus metrics exposition
//!
//! - `relay_requests_total` (counter): label `status`
//! - `relay_request_duration_seconds` (histogram): label `status`
//! - `relay_configured_keys` (gauge)
//!
//! Per-attempt counters (`relay_upstream_attempts_total`,
//! `relay_key_rotations_total`) are recorded by the completion crate.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "relay_request_duration_seconds";

/// 5ms to 60s; the upper bound matches the default upstream timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for rendering.
///
/// Must run before any metric is emitted.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a finished `/api/chat` request.
pub fn record_request(status: u16, duration_secs: f64) {
    let status = status.to_string();
    metrics::counter!("relay_requests_total", "status" => status.clone()).increment(1);
    metrics::histogram!(DURATION_METRIC, "status" => status).record(duration_secs);
}

pub fn set_configured_keys(count: usize) {
    metrics::gauge!("relay_configured_keys").set(count as f64);
}

/// Recorder/handle pair that is not installed globally, for tests.
#[cfg(test)]
pub fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder()
        .expect("failed to set histogram buckets")
        .build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}
