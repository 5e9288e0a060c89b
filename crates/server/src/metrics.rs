//! Process metrics
//!
//! Counters and histograms exposed for Prometheus on `/metrics`.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_call_placed(scenario_id: &str) {
    counter!("callprobe_calls_placed_total", "scenario" => scenario_id.to_string()).increment(1);
}

pub fn record_session_started(scenario_id: &str) {
    counter!("callprobe_sessions_started_total", "scenario" => scenario_id.to_string()).increment(1);
    gauge!("callprobe_sessions_active").increment(1.0);
}

pub fn record_session_finished(scenario_id: &str, reason: &str, duration_secs: f64) {
    counter!(
        "callprobe_sessions_finished_total",
        "scenario" => scenario_id.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
    gauge!("callprobe_sessions_active").decrement(1.0);
    histogram!("callprobe_session_duration_seconds").record(duration_secs);
}

/// Handle backed by a local recorder, for tests that need an `AppState`
/// without touching the global recorder.
#[cfg(test)]
pub fn test_recorder() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
