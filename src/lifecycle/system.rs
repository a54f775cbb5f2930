//! Process lifecycle coordination.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::health::HealthCheckable;
use crate::lifecycle::group::TaskGroup;
use crate::lifecycle::signals::{OsSignals, SignalSource};
use crate::observability::metrics;
use crate::BoxError;

type UnitFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Error returned by [`System::run`].
#[derive(Debug, Error)]
pub enum RunError {
    /// A termination signal arrived and the termination delay elapsed.
    #[error("terminated")]
    Terminated,
    /// Signal handlers could not be installed.
    #[error("failed to watch for signals: {0}")]
    Signals(#[source] io::Error),
    /// A service returned an error.
    #[error(transparent)]
    Service(BoxError),
}

/// Error returned when registering a cleanup.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("cleanup {0:?} is already registered")]
    Duplicate(String),
}

struct CleanupEntry {
    name: String,
    action: UnitFn,
}

/// The useful work a process performs.
///
/// A `System` holds a set of long-lived concurrent services (an API server,
/// a reconciler, ...) and coordinates their health checks, their shutdown
/// on signals or first failure, and cleanup afterwards.
///
/// Registration happens before [`run`](Self::run); `run` borrows the system
/// mutably, so nothing can be registered while it is running.
pub struct System {
    services: Vec<UnitFn>,
    health_checks: Vec<Arc<dyn HealthCheckable>>,
    cleanups: Vec<CleanupEntry>,
    signals: Arc<dyn SignalSource>,
}

impl System {
    /// Create an empty system that listens for OS signals.
    pub fn new() -> Self {
        Self::with_signals(OsSignals)
    }

    /// Create an empty system that waits on `signals` instead of the OS.
    pub fn with_signals(signals: impl SignalSource) -> Self {
        Self {
            services: Vec::new(),
            health_checks: Vec::new(),
            cleanups: Vec::new(),
            signals: Arc::new(signals),
        }
    }

    /// Add a service to be started by [`run`](Self::run).
    ///
    /// The token passed to the service is cancelled when the system shuts
    /// down. A service must watch it, stop taking on new work, drain, and
    /// return. Extra teardown belongs in a cleanup.
    ///
    /// If a service depends on something else (a database connection, a
    /// queue) to finish in-flight work, that dependency should stay usable
    /// during cancellation and only shut down fully in a cleanup.
    pub fn add_service<F, Fut, E>(&mut self, service: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.services.push(boxed_unit(service));
    }

    pub fn add_health_check(&mut self, check: Arc<dyn HealthCheckable>) {
        self.health_checks.push(check);
    }

    /// Register a cleanup to be run by [`cleanup`](Self::cleanup).
    ///
    /// Names must be unique.
    pub fn add_cleanup<F, Fut, E>(&mut self, name: impl Into<String>, action: F) -> Result<(), CleanupError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let name = name.into();
        if self.cleanups.iter().any(|entry| entry.name == name) {
            return Err(CleanupError::Duplicate(name));
        }
        self.cleanups.push(CleanupEntry {
            name,
            action: boxed_unit(action),
        });
        Ok(())
    }

    /// Health checkers registered so far, in registration order.
    pub fn health_checks(&self) -> &[Arc<dyn HealthCheckable>] {
        &self.health_checks
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Run every registered service until the system shuts down.
    ///
    /// Returns once every service has returned. The result is the error
    /// that caused the shutdown, or `Ok` if `parent` was cancelled and all
    /// services returned cleanly.
    ///
    /// After a termination signal, the system waits `termination_delay`
    /// before cancelling the services, so load balancers can stop routing
    /// traffic here first.
    ///
    /// Services are taken out of the system: each runs exactly once.
    pub async fn run(&mut self, parent: &CancellationToken, termination_delay: Duration) -> Result<(), RunError> {
        let services = std::mem::take(&mut self.services);
        tracing::info!(services = services.len(), "System starting");

        let mut group = TaskGroup::new(parent);
        let signals = self.signals.clone();
        group.spawn(move |token| watch_signals(signals, token, termination_delay));

        for service in services {
            group.spawn(|token| async move {
                let result = service(token).await;
                metrics::record_service_exit(result.is_ok());
                result.map_err(RunError::Service)
            });
        }

        let result = group.join().await;
        match &result {
            Ok(()) => tracing::info!("System stopped"),
            Err(e) => tracing::warn!(error = %e, "System stopped with error"),
        }
        result
    }

    /// Run every registered cleanup, most recently added first.
    ///
    /// Cleanups run one at a time. Their errors are discarded and never stop
    /// later cleanups. Intended to be called after [`run`](Self::run) has
    /// returned, with a token that is not the one `run` was given.
    ///
    /// Cleanups are consumed: calling this again only runs cleanups added
    /// since.
    pub async fn cleanup(&mut self, token: &CancellationToken) {
        for entry in std::mem::take(&mut self.cleanups).into_iter().rev() {
            tracing::debug!(cleanup = %entry.name, "Running cleanup");
            let _ = (entry.action)(token.clone()).await;
        }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

fn boxed_unit<F, Fut, E>(unit: F) -> UnitFn
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    Box::new(move |token| unit(token).map(|res| res.map_err(Into::into)).boxed())
}

/// Wait for a termination signal or for the system to be cancelled.
///
/// A signal is reported as [`RunError::Terminated`] once `delay` has passed;
/// that error is what cancels the rest of the system.
async fn watch_signals(
    signals: Arc<dyn SignalSource>,
    token: CancellationToken,
    delay: Duration,
) -> Result<(), RunError> {
    let signal = tokio::select! {
        received = signals.recv() => received.map_err(RunError::Signals)?,
        _ = token.cancelled() => return Ok(()),
    };

    tracing::info!(
        %signal,
        delay_ms = delay.as_millis() as u64,
        "Termination signal received, shutting down after delay"
    );

    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = token.cancelled() => {
            tracing::debug!("System cancelled during termination delay");
        }
    }
    Err(RunError::Terminated)
}
