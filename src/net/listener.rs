//! Listener binding for the supported network families.
//!
//! # Responsibilities
//! - Parse the network family (`tcp`, `tcp4`, `tcp6`, `unix`)
//! - Resolve and bind addresses, including `":port"` for all interfaces
//! - Accept incoming connections
//!
//! # Design Decisions
//! - Binding failures are reported at construction, never while serving
//! - `tcp` tries every resolved address, `tcp4`/`tcp6` only their family
//! - A unix socket file lives as long as its listener

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("unknown network {0:?}")]
    UnknownNetwork(String),
    #[error("invalid address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Network family to listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
    Unix,
}

impl FromStr for Network {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            "unix" => Ok(Network::Unix),
            other => Err(ListenerError::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Unix => "unix",
        };
        f.write_str(name)
    }
}

/// A bound listener.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixSocket),
}

/// A unix listener that unlinks its socket file when dropped.
#[cfg(unix)]
#[derive(Debug)]
pub struct UnixSocket {
    listener: UnixListener,
    path: PathBuf,
}

#[cfg(unix)]
impl Drop for UnixSocket {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed unix socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove unix socket"),
        }
    }
}

/// A connection accepted by a [`Listener`].
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Listener {
    /// Bind `addr` on `network`.
    pub async fn bind(network: Network, addr: &str) -> Result<Self, ListenerError> {
        let listener = match network {
            Network::Unix => bind_unix(addr)?,
            _ => {
                let candidates = resolve(network, addr).await?;
                let listener = TcpListener::bind(&candidates[..])
                    .await
                    .map_err(|source| ListenerError::Bind {
                        addr: addr.to_string(),
                        source,
                    })?;
                Listener::Tcp(listener)
            }
        };

        tracing::info!(
            network = %network,
            address = %listener.local_addr().unwrap_or_else(|_| addr.to_string()),
            "Listener bound"
        );
        Ok(listener)
    }

    /// Accept a new connection and describe its peer.
    pub async fn accept(&self) -> io::Result<(Stream, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((Stream::Tcp(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(socket) => {
                let (stream, peer) = socket.listener.accept().await?;
                Ok((Stream::Unix(stream), format!("{peer:?}")))
            }
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<String> {
        match self {
            Listener::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            #[cfg(unix)]
            Listener::Unix(socket) => {
                let addr = socket.listener.local_addr()?;
                Ok(addr
                    .as_pathname()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default())
            }
        }
    }
}

#[cfg(unix)]
fn bind_unix(addr: &str) -> Result<Listener, ListenerError> {
    let listener = UnixListener::bind(addr).map_err(|source| ListenerError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    Ok(Listener::Unix(UnixSocket {
        listener,
        path: PathBuf::from(addr),
    }))
}

#[cfg(not(unix))]
fn bind_unix(addr: &str) -> Result<Listener, ListenerError> {
    Err(ListenerError::InvalidAddress {
        addr: addr.to_string(),
        reason: "unix sockets are not supported on this platform".to_string(),
    })
}

/// Resolve `host:port` for a TCP family. An empty host means every
/// interface.
async fn resolve(network: Network, addr: &str) -> Result<Vec<SocketAddr>, ListenerError> {
    let invalid = |reason: &str| ListenerError::InvalidAddress {
        addr: addr.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let resolved: Vec<SocketAddr> = if host.is_empty() {
        match network {
            Network::Tcp6 => vec![SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))],
            _ => vec![SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))],
        }
    } else {
        tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| ListenerError::Bind {
                addr: addr.to_string(),
                source,
            })?
            .collect()
    };

    let candidates: Vec<SocketAddr> = resolved
        .into_iter()
        .filter(|candidate| match network {
            Network::Tcp4 => candidate.is_ipv4(),
            Network::Tcp6 => candidate.is_ipv6(),
            _ => true,
        })
        .collect();

    if candidates.is_empty() {
        return Err(invalid(&format!("no {network} address")));
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network() {
        assert_eq!("".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("tcp6".parse::<Network>().unwrap(), Network::Tcp6);
        assert_eq!("unix".parse::<Network>().unwrap(), Network::Unix);
        assert!(matches!(
            "udp".parse::<Network>(),
            Err(ListenerError::UnknownNetwork(n)) if n == "udp"
        ));
    }

    #[tokio::test]
    async fn test_empty_host_means_all_interfaces() {
        let addrs = resolve(Network::Tcp, ":10001").await.unwrap();
        assert_eq!(addrs, vec![SocketAddr::from((Ipv4Addr::UNSPECIFIED, 10001))]);

        let addrs = resolve(Network::Tcp6, ":10001").await.unwrap();
        assert_eq!(addrs, vec![SocketAddr::from((Ipv6Addr::UNSPECIFIED, 10001))]);
    }

    #[tokio::test]
    async fn test_family_filter() {
        let err = resolve(Network::Tcp6, "127.0.0.1:80").await.unwrap_err();
        assert!(matches!(err, ListenerError::InvalidAddress { .. }));
        assert!(resolve(Network::Tcp4, "127.0.0.1:80").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_port() {
        assert!(resolve(Network::Tcp, "localhost").await.is_err());
        assert!(resolve(Network::Tcp, "localhost:http").await.is_err());
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = Listener::bind(Network::Tcp, "127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.starts_with("127.0.0.1:"));
        assert!(!addr.ends_with(":0"));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let first = Listener::bind(Network::Tcp, "127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap();
        let err = Listener::bind(Network::Tcp, &addr).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_removed_on_drop() {
        let path = std::env::temp_dir().join(format!("listener-drop-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let addr = path.display().to_string();

        let listener = Listener::bind(Network::Unix, &addr).await.unwrap();
        assert_eq!(listener.local_addr().unwrap(), addr);
        assert!(path.exists());

        drop(listener);
        assert!(!path.exists());

        let listener = Listener::bind(Network::Unix, &addr).await.unwrap();
        drop(listener);
        assert!(!path.exists());
    }
}
