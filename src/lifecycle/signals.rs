//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM/SIGINT on behalf of the [`System`](super::System)
//! - Allow the process-global signal state to be swapped out in tests
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are installed lazily, when the watcher starts waiting
//! - The source only reports a signal; the system decides what to do with it

use std::fmt;
use std::io;

use async_trait::async_trait;
use tokio::sync::watch;

/// A termination signal received by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => f.write_str("SIGINT"),
            Signal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Source of termination signals.
#[async_trait]
pub trait SignalSource: Send + Sync + 'static {
    /// Wait until a termination signal arrives.
    async fn recv(&self) -> io::Result<Signal>;
}

/// Signals delivered to this process by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

#[async_trait]
impl SignalSource for OsSignals {
    #[cfg(unix)]
    async fn recv(&self) -> io::Result<Signal> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = interrupt.recv() => Ok(Signal::Interrupt),
            _ = terminate.recv() => Ok(Signal::Terminate),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&self) -> io::Result<Signal> {
        tokio::signal::ctrl_c().await?;
        Ok(Signal::Interrupt)
    }
}

/// A signal source driven by hand, for tests and embedding.
#[derive(Debug, Clone)]
pub struct ManualSignal {
    rx: watch::Receiver<Option<Signal>>,
}

/// Sending half of a [`ManualSignal`].
#[derive(Debug, Clone)]
pub struct SignalTrigger {
    tx: watch::Sender<Option<Signal>>,
}

impl ManualSignal {
    pub fn new() -> (Self, SignalTrigger) {
        let (tx, rx) = watch::channel(None);
        (Self { rx }, SignalTrigger { tx })
    }
}

impl SignalTrigger {
    /// Deliver `signal` to every watcher waiting on the paired source.
    pub fn send(&self, signal: Signal) {
        self.tx.send_replace(Some(signal));
    }
}

#[async_trait]
impl SignalSource for ManualSignal {
    async fn recv(&self) -> io::Result<Signal> {
        let mut rx = self.rx.clone();
        let delivered = rx.wait_for(Option::is_some).await.map(|signal| *signal);
        match delivered {
            Ok(signal) => Ok(signal.unwrap_or(Signal::Terminate)),
            // Trigger dropped without firing: never deliver a signal.
            Err(_) => std::future::pending().await,
        }
    }
}
