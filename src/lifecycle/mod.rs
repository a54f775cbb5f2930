//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Register services, health checks, cleanups → load health server
//!
//! Run (system.rs):
//!     signal watcher + every service in one fail-fast group (group.rs)
//!     → first error cancels the shared token → all units drain → return
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait termination delay → report "terminated"
//!
//! Cleanup (system.rs):
//!     registered cleanups, newest first, one at a time, errors ignored
//! ```
//!
//! # Design Decisions
//! - One cancellation token per run; nothing un-cancels it
//! - Cancellation is cooperative: services must watch their token
//! - There is no hard kill at this level; only HTTP servers force-close
//!   connections after their grace period

pub mod group;
pub mod signals;
pub mod startup;
pub mod system;

pub use group::TaskGroup;
pub use signals::{ManualSignal, OsSignals, Signal, SignalSource, SignalTrigger};
pub use startup::{load_health_server, StartupError};
pub use system::{CleanupError, RunError, System};
