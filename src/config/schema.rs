//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::Network;
use crate::observability::logging::LogFormat;

/// Root configuration for the process.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Health endpoint settings.
    pub health: HealthConfig,

    /// Shutdown behaviour of the system.
    pub lifecycle: LifecycleConfig,

    /// Timeouts applied to every HTTP server.
    pub server: ServerTimeouts,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Bind address. An empty host (":10001") listens on every interface.
    pub addr: String,

    /// Network family of the listener.
    pub network: Network,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            addr: ":10001".to_string(),
            network: Network::Tcp,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds between a termination signal and cancelling the services.
    pub termination_delay_secs: u64,
}

impl LifecycleConfig {
    pub fn termination_delay(&self) -> Duration {
        Duration::from_secs(self.termination_delay_secs)
    }
}

/// HTTP server timeouts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerTimeouts {
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,

    /// Time in-flight requests get to finish once shutdown begins.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            read_timeout_secs: 55,
            write_timeout_secs: 55,
            shutdown_grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Address of the OTLP trace collector.
    pub otlp_endpoint: String,

    pub log_format: LogFormat,

    /// Serve Prometheus metrics on the health server.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: "localhost:4317".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}
