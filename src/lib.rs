//! Process lifecycle coordination for long-running network services.
//!
//! A [`System`] runs a set of services under one cancellation token, shuts
//! them all down on a termination signal or the first failure, and runs
//! cleanups afterwards. [`HttpServer`] and [`HealthApi`] are services built
//! on the same contract.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::RuntimeConfig;
pub use health::{HealthApi, HealthCheckable};
pub use http::{HttpServer, ServerConfig};
pub use lifecycle::{RunError, System, TaskGroup};

/// Opaque error returned by services, cleanups and health checks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
