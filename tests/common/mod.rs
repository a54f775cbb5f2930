//! Shared utilities for integration testing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use service_runtime::{BoxError, HealthCheckable};
use tokio_util::sync::CancellationToken;

/// Ordered log of events shared between test units.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// A health check with a fixed outcome, optionally slow.
#[allow(dead_code)]
pub struct StaticCheck {
    pub name: &'static str,
    pub healthy: bool,
    pub delay: Duration,
}

#[allow(dead_code)]
impl StaticCheck {
    pub fn passing(name: &'static str) -> Arc<dyn HealthCheckable> {
        Arc::new(Self {
            name,
            healthy: true,
            delay: Duration::ZERO,
        })
    }

    pub fn failing(name: &'static str) -> Arc<dyn HealthCheckable> {
        Arc::new(Self {
            name,
            healthy: false,
            delay: Duration::ZERO,
        })
    }

    pub fn slow(name: &'static str, delay: Duration) -> Arc<dyn HealthCheckable> {
        Arc::new(Self {
            name,
            healthy: true,
            delay,
        })
    }
}

#[async_trait]
impl HealthCheckable for StaticCheck {
    fn name(&self) -> &str {
        self.name
    }

    async fn check(&self, _token: CancellationToken) -> Result<(), BoxError> {
        tokio::time::sleep(self.delay).await;
        if self.healthy {
            Ok(())
        } else {
            Err(format!("{} unreachable", self.name).into())
        }
    }
}

/// HTTP client that never pools connections or goes through a proxy.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
