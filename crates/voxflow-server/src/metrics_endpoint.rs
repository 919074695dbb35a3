//! Prometheus metrics endpoint

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Must run once at startup, before any
/// metric is recorded.
pub fn init_metrics() -> Result<(), String> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install prometheus recorder: {e}"))?;
    let _ = METRICS_HANDLE.set(handle);

    // Touch the fleet-wide counters so they exist from the first scrape
    metrics::counter!("voxflow_conversations_started_total").absolute(0);
    metrics::counter!("voxflow_conversations_closed_total").absolute(0);
    metrics::counter!("voxflow_tts_frames_dropped_total").absolute(0);
    metrics::counter!("voxflow_packets_dropped_total").absolute(0);
    Ok(())
}

/// `GET /metrics`
pub async fn render() -> impl IntoResponse {
    match METRICS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed\n".to_string(),
        ),
    }
}
