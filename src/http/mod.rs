//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Listener (net)
//!     → server.rs accept loop (one task per connection, HTTP/1.1 + HTTP/2)
//!     → middleware (trace, request timeout)
//!     → Axum router supplied by the caller
//!
//! Shutdown:
//!     token cancelled → stop accepting → drain connections
//!     → grace period elapsed → close the rest
//! ```

pub mod server;

pub use server::{load_into_system, HttpServer, ServerConfig, ServerError};
