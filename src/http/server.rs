//! HTTP server with graceful shutdown.
//!
//! # Responsibilities
//! - Own one listener and serve an Axum router on it
//! - Configure HTTP/1.1 and HTTP/2 support
//! - Wire up middleware (tracing, request timeout)
//! - Stop accepting on cancellation and drain in-flight connections
//! - Close whatever is still open once the grace period has passed

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto::Builder,
    service::TowerToHyperService,
};
use thiserror::Error;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::lifecycle::{System, TaskGroup};
use crate::net::{Listener, ListenerError, Network, Stream};

pub const DEFAULT_SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(55);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(55);

/// Error type for HTTP server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("error starting {name:?} server: {source}")]
    Start {
        name: String,
        #[source]
        source: ListenerError,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    #[error("server shutdown failed: {open} connections still open after {grace:?}")]
    ShutdownTimeout { open: usize, grace: Duration },
}

/// Configuration for one [`HttpServer`].
#[derive(Clone)]
pub struct ServerConfig {
    /// Name of the server, for logs.
    pub name: String,
    /// Address to listen on.
    pub addr: String,
    pub network: Network,
    /// Router to delegate requests to.
    pub handler: Router,
    /// How long in-flight requests may run after shutdown begins.
    pub shutdown_grace_period: Duration,
    /// Time allowed to receive a request's headers.
    pub read_timeout: Duration,
    /// Time allowed to produce a response.
    pub write_timeout: Duration,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, handler: Router) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            network: Network::default(),
            handler,
            shutdown_grace_period: DEFAULT_SHUTDOWN_GRACE_PERIOD,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// A zero grace period falls back to the default.
    pub fn shutdown_grace_period(mut self, grace: Duration) -> Self {
        self.shutdown_grace_period = if grace.is_zero() {
            DEFAULT_SHUTDOWN_GRACE_PERIOD
        } else {
            grace
        };
        self
    }

    pub fn timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }
}

/// An HTTP server bound to its listener, ready to be run as a service.
pub struct HttpServer {
    name: String,
    listener: Listener,
    local_addr: String,
    router: Router,
    grace_period: Duration,
    read_timeout: Duration,
}

impl HttpServer {
    /// Bind the configured address. Failing to bind is fatal to startup.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let start_error = |source| ServerError::Start {
            name: config.name.clone(),
            source,
        };

        let listener = Listener::bind(config.network, &config.addr)
            .await
            .map_err(start_error)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| {
                start_error(ListenerError::Bind {
                    addr: config.addr.clone(),
                    source,
                })
            })?;

        let router = Self::build_router(config.handler, config.write_timeout);

        Ok(Self {
            name: config.name,
            listener,
            local_addr,
            router,
            grace_period: config.shutdown_grace_period,
            read_timeout: config.read_timeout,
        })
    }

    #[allow(deprecated)]
    fn build_router(handler: Router, write_timeout: Duration) -> Router {
        handler.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(write_timeout)),
        )
    }

    /// The address the server is listening on.
    pub fn addr(&self) -> &str {
        &self.local_addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serve until `token` is cancelled, then shut down gracefully.
    ///
    /// Runs an accept loop next to a shutdown watcher. On cancellation the
    /// accept loop stops taking connections, open connections finish their
    /// in-flight requests, and the watcher waits up to the grace period for
    /// them. Connections still open after that are closed and
    /// [`ServerError::ShutdownTimeout`] is returned.
    pub async fn serve(self, token: CancellationToken) -> Result<(), ServerError> {
        let HttpServer {
            name,
            listener,
            local_addr,
            router,
            grace_period,
            read_timeout,
        } = self;

        tracing::info!(server = %name, address = %local_addr, "HTTP server starting");

        let connections = TaskTracker::new();
        let force_close = CancellationToken::new();

        let mut group = TaskGroup::new(&token);
        {
            let name = name.clone();
            let connections = connections.clone();
            let force_close = force_close.clone();
            group.spawn(move |token| watch_shutdown(name, token, connections, force_close, grace_period));
        }
        group.spawn(move |token| {
            let acceptor = Acceptor {
                router,
                builder: Arc::new(connection_builder(read_timeout)),
                connections,
                force_close,
            };
            acceptor.run(listener, token)
        });

        let result = group.join().await;
        match &result {
            Ok(()) => tracing::info!(server = %name, "HTTP server stopped"),
            Err(e) => tracing::error!(server = %name, error = %e, "HTTP server stopped with error"),
        }
        result
    }
}

/// Bind `config` and register the server as a service of `system`.
///
/// Returns the bound address.
pub async fn load_into_system(config: ServerConfig, system: &mut System) -> Result<String, ServerError> {
    let server = HttpServer::bind(config).await?;
    let addr = server.addr().to_string();
    system.add_service(move |token| server.serve(token));
    Ok(addr)
}

fn connection_builder(read_timeout: Duration) -> Builder<TokioExecutor> {
    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout);
    builder
}

async fn watch_shutdown(
    name: String,
    token: CancellationToken,
    connections: TaskTracker,
    force_close: CancellationToken,
    grace: Duration,
) -> Result<(), ServerError> {
    token.cancelled().await;
    tracing::info!(
        server = %name,
        open_connections = connections.len(),
        grace = ?grace,
        "HTTP server draining"
    );

    if tokio::time::timeout(grace, connections.wait()).await.is_ok() {
        return Ok(());
    }

    let open = connections.len();
    tracing::warn!(server = %name, open_connections = open, "Grace period elapsed, closing connections");
    force_close.cancel();
    connections.wait().await;
    Err(ServerError::ShutdownTimeout { open, grace })
}

struct Acceptor {
    router: Router,
    builder: Arc<Builder<TokioExecutor>>,
    connections: TaskTracker,
    force_close: CancellationToken,
}

impl Acceptor {
    /// Accept until cancelled. Stopping because of cancellation is not an
    /// error.
    async fn run(self, listener: Listener, token: CancellationToken) -> Result<(), ServerError> {
        let result = loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break Ok(()),
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) if is_transient(&e) => {
                    tracing::debug!(error = %e, "Transient accept error");
                    continue;
                }
                Err(e) if is_resource_exhausted(&e) => {
                    tracing::warn!(error = %e, "Accept failed, backing off");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
                Err(e) => break Err(ServerError::Accept(e)),
            };

            tracing::debug!(peer = %peer, "Connection accepted");
            match stream {
                Stream::Tcp(stream) => self.spawn_connection(TokioIo::new(stream), &token),
                #[cfg(unix)]
                Stream::Unix(stream) => self.spawn_connection(TokioIo::new(stream), &token),
            }
        };

        // No new connections from here on; the watcher can finish once the
        // open ones are gone.
        self.connections.close();
        drop(listener);
        result
    }

    fn spawn_connection<I>(&self, io: I, drain: &CancellationToken)
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let builder = self.builder.clone();
        let service = TowerToHyperService::new(self.router.clone());
        let drain = drain.clone();
        let force_close = self.force_close.clone();

        self.connections.spawn(async move {
            let conn = builder.serve_connection_with_upgrades(io, service);
            tokio::pin!(conn);

            let mut draining = false;
            loop {
                tokio::select! {
                    res = conn.as_mut() => {
                        if let Err(e) = res {
                            tracing::debug!(error = %e, "Connection closed with error");
                        }
                        return;
                    }
                    _ = drain.cancelled(), if !draining => {
                        draining = true;
                        conn.as_mut().graceful_shutdown();
                    }
                    _ = force_close.cancelled() => {
                        tracing::debug!("Connection closed after grace period");
                        return;
                    }
                }
            }
        });
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}

/// ENFILE / EMFILE
fn is_resource_exhausted(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(23) | Some(24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn router() -> Router {
        Router::new().route("/", get(|| async { "ok" }))
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::new("test", ":0", router());
        assert_eq!(config.network, Network::Tcp);
        assert_eq!(config.shutdown_grace_period, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(55));
        assert_eq!(config.write_timeout, Duration::from_secs(55));
    }

    #[test]
    fn test_zero_grace_period_uses_default() {
        let config = ServerConfig::new("test", ":0", router()).shutdown_grace_period(Duration::ZERO);
        assert_eq!(config.shutdown_grace_period, DEFAULT_SHUTDOWN_GRACE_PERIOD);
    }

    #[tokio::test]
    async fn test_bind_failure_names_server() {
        let config = ServerConfig::new("api", "not-an-address", router());
        let err = HttpServer::bind(config).await.err().unwrap();
        assert!(matches!(err, ServerError::Start { ref name, .. } if name == "api"));
        assert!(err.to_string().starts_with("error starting \"api\" server"));
    }

    #[tokio::test]
    async fn test_serve_returns_ok_when_idle_and_cancelled() {
        let server = HttpServer::bind(ServerConfig::new("test", "127.0.0.1:0", router()))
            .await
            .unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(server.serve(token.clone()));

        token.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_load_into_system_registers_service() {
        let mut system = System::new();
        let addr = load_into_system(ServerConfig::new("test", "127.0.0.1:0", router()), &mut system)
            .await
            .unwrap();
        assert!(addr.starts_with("127.0.0.1:"));
        assert_eq!(system.service_count(), 1);
    }
}
