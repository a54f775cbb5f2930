//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Collaborators implement HealthCheckable (check.rs)
//!     → registered on the System
//!     → HealthChecker built once at startup (aggregator.rs)
//!
//! GET /zhealth (api.rs)
//!     → run every check with its own timeout
//!     → worst-of aggregate status
//!     → JSON report, 200 or 503
//! ```
//!
//! # Design Decisions
//! - The set of checks is fixed once the checker is built
//! - Check names are unique per checker
//! - A failing check never fails the process, it only shows in the report
//! - Degraded is reachable only through `skip_on_err` checks, which the
//!   system wiring never registers

pub mod aggregator;
pub mod api;
pub mod check;

pub use aggregator::{CheckResult, CheckStatus, Component, HealthChecker, HealthError, HealthReport, Status};
pub use api::{HealthApi, HEALTH_PATH, METRICS_PATH};
pub use check::{CheckConfig, HealthCheckable, DEFAULT_CHECK_TIMEOUT};
