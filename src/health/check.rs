//! Health check capability and per-check policy.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::BoxError;

/// Probe timeout applied when a collaborator is loaded from the system.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A collaborator that can report its own liveness.
///
/// Names must be unique among the checks served by one
/// [`HealthChecker`](super::HealthChecker).
#[async_trait]
pub trait HealthCheckable: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Return `Ok` when healthy. The error is shown in the health report.
    ///
    /// `token` is cancelled when the check times out, when nobody waits for
    /// the report any more, or when the system shuts down.
    async fn check(&self, token: CancellationToken) -> Result<(), BoxError>;
}

/// How a single check contributes to the aggregate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckConfig {
    /// A check still running after this long counts as failed.
    pub timeout: Duration,
    /// When set, a failure degrades the service instead of making it
    /// unavailable.
    pub skip_on_err: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CHECK_TIMEOUT,
            skip_on_err: false,
        }
    }
}
