//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! (network, address)
//!     → listener.rs (resolve, bind, accept)
//!     → Stream handed to the HTTP layer
//! ```

pub mod listener;

pub use listener::{Listener, ListenerError, Network, Stream};
