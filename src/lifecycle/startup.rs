//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the health checker from the checks registered on the system
//! - Bind the health server and add it to the system as a service
//! - Stop in-flight probes when the system shuts down
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Health checks must be registered before the health server is loaded;
//!   later registrations are not served

use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeConfig;
use crate::health::{Component, HealthApi, HealthChecker, HealthError};
use crate::http::{self, ServerConfig, ServerError};
use crate::lifecycle::System;
use crate::BoxError;

/// Name of the health server, for logs.
pub const HEALTH_SERVER_NAME: &str = "healthchecks";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("error creating health check API: {0}")]
    Health(#[from] HealthError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Serve the health of every check registered on `system` from a new HTTP
/// server, itself registered as a service of `system`.
///
/// Returns the address the health server is bound to.
pub async fn load_health_server(
    config: &RuntimeConfig,
    system: &mut System,
    prometheus: Option<PrometheusHandle>,
) -> Result<String, StartupError> {
    let component = Component {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let checker = HealthChecker::from_checks(component, system.health_checks())?;
    let checks = checker.len();
    let probes = checker.shutdown_token().clone();

    let api = match prometheus {
        Some(handle) => HealthApi::with_metrics(checker, handle),
        None => HealthApi::new(checker),
    };

    let timeouts = &config.server;
    let server_config = ServerConfig::new(HEALTH_SERVER_NAME, config.health.addr.clone(), api.into_router())
        .network(config.health.network)
        .shutdown_grace_period(Duration::from_secs(timeouts.shutdown_grace_secs))
        .timeouts(
            Duration::from_secs(timeouts.read_timeout_secs),
            Duration::from_secs(timeouts.write_timeout_secs),
        );

    let addr = http::load_into_system(server_config, system).await?;
    system.add_service(move |token: CancellationToken| async move {
        token.cancelled().await;
        probes.cancel();
        Ok::<_, BoxError>(())
    });
    tracing::info!(address = %addr, checks, "Health server loaded");
    Ok(addr)
}
