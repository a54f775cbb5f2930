//! Metrics collection and exposition.
//!
//! # Metrics
//! - `service_runtime_services_exited_total` (counter): services that returned, by outcome
//! - `service_runtime_health_checks_total` (counter): check runs, by check and status
//! - `service_runtime_health_check_duration_seconds` (histogram): time spent per check
//!
//! Without an installed recorder every call here is a no-op.

use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder for this process.
///
/// The returned handle renders the scrape payload; the health API serves it.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_service_exit(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("service_runtime_services_exited_total", "outcome" => outcome).increment(1);
}

pub fn record_health_check(check: &str, status: &'static str, elapsed: Duration) {
    counter!(
        "service_runtime_health_checks_total",
        "check" => check.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!("service_runtime_health_check_duration_seconds", "check" => check.to_string())
        .record(elapsed.as_secs_f64());
}
