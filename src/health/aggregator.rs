//! Runs registered health checks and folds them into one status.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::health::check::{CheckConfig, HealthCheckable};
use crate::observability::metrics;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("health check {0:?} is already registered")]
    DuplicateCheck(String),
}

/// Aggregate status of all checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Every check passed.
    Healthy,
    /// Only checks marked `skip_on_err` failed.
    Degraded,
    /// At least one required check failed or timed out.
    Unavailable,
}

impl Status {
    pub fn is_available(self) -> bool {
        !matches!(self, Status::Unavailable)
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Timeout,
}

impl CheckStatus {
    fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Fail => "fail",
            CheckStatus::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub name: String,
    pub version: String,
}

/// Result of one measurement, as served on the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub component: Component,
    pub checks: BTreeMap<String, CheckResult>,
}

struct RegisteredCheck {
    check: Arc<dyn HealthCheckable>,
    config: CheckConfig,
}

/// A fixed set of health checks, measured on demand.
pub struct HealthChecker {
    component: Component,
    checks: Vec<RegisteredCheck>,
    shutdown: CancellationToken,
}

impl HealthChecker {
    pub fn new(component: Component) -> Self {
        Self {
            component,
            checks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Build a checker over `checks`, each with the default policy.
    pub fn from_checks(component: Component, checks: &[Arc<dyn HealthCheckable>]) -> Result<Self, HealthError> {
        let mut checker = Self::new(component);
        for check in checks {
            checker.register(check.clone(), CheckConfig::default())?;
        }
        Ok(checker)
    }

    pub fn register(&mut self, check: Arc<dyn HealthCheckable>, config: CheckConfig) -> Result<(), HealthError> {
        if self.checks.iter().any(|c| c.check.name() == check.name()) {
            return Err(HealthError::DuplicateCheck(check.name().to_string()));
        }
        self.checks.push(RegisteredCheck { check, config });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Parent of every probe's token. Cancelling it stops in-flight probes
    /// and makes later ones start cancelled.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Run every check concurrently and compute the aggregate status.
    pub async fn measure(&self) -> HealthReport {
        let results = join_all(self.checks.iter().map(|registered| run_check(registered, &self.shutdown))).await;

        let mut status = Status::Healthy;
        let mut checks = BTreeMap::new();
        for (registered, result) in self.checks.iter().zip(results) {
            if result.status != CheckStatus::Pass {
                status = match (status, registered.config.skip_on_err) {
                    (Status::Unavailable, _) | (_, false) => Status::Unavailable,
                    (_, true) => Status::Degraded,
                };
            }
            checks.insert(registered.check.name().to_string(), result);
        }

        HealthReport {
            status,
            component: self.component.clone(),
            checks,
        }
    }
}

async fn run_check(registered: &RegisteredCheck, shutdown: &CancellationToken) -> CheckResult {
    let name = registered.check.name();
    let probe = shutdown.child_token();
    // Cancels the probe on timeout, and when the measurement is dropped.
    let _guard = probe.clone().drop_guard();
    let start = Instant::now();

    let (status, error) = match tokio::time::timeout(registered.config.timeout, registered.check.check(probe)).await {
        Ok(Ok(())) => (CheckStatus::Pass, None),
        Ok(Err(e)) => {
            tracing::warn!(check = %name, error = %e, "Health check failed");
            (CheckStatus::Fail, Some(e.to_string()))
        }
        Err(_) => {
            tracing::warn!(check = %name, timeout = ?registered.config.timeout, "Health check timed out");
            (CheckStatus::Timeout, Some("timeout during health check".to_string()))
        }
    };

    let elapsed = start.elapsed();
    metrics::record_health_check(name, status.as_str(), elapsed);

    CheckResult {
        status,
        error,
        duration_ms: elapsed.as_millis() as u64,
    }
}
