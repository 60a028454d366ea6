//! Endpoint selection and socket plumbing shared by both peers.
//!
//! Both processes run on the same machine, so transport means a Unix domain
//! socket where the OS has them and loopback TCP everywhere else. The
//! [`Endpoint`] type names a listening location in either family and parses
//! the string forms embedders put in configuration.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

use crate::config::TransportDefaults;
use crate::error::{BridgeError, Result};

/// A local listening location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Socket file path. Only bindable on Unix platforms.
    Unix(PathBuf),
    /// Loopback (or other) TCP address.
    Tcp(SocketAddr),
}

impl Endpoint {
    /// The conventional local endpoint for this OS: a socket file under the
    /// temp directory on Unix, loopback TCP elsewhere.
    pub fn default_for_platform() -> Self {
        #[cfg(unix)]
        {
            Endpoint::Unix(std::env::temp_dir().join(TransportDefaults::SOCKET_FILE_NAME))
        }
        #[cfg(not(unix))]
        {
            Endpoint::Tcp(SocketAddr::from(([127, 0, 0, 1], TransportDefaults::TCP_PORT)))
        }
    }

    /// Parse an endpoint string.
    ///
    /// Three forms are accepted: `port:<n>` for loopback TCP on port `n`, a
    /// full socket address like `127.0.0.1:27015`, and anything else is
    /// taken as a socket file path.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BridgeError::InvalidEndpoint {
                message: "empty endpoint string".to_string(),
            });
        }

        if let Some(port) = s.strip_prefix("port:") {
            let port: u16 = port.parse().map_err(|_| BridgeError::InvalidEndpoint {
                message: format!("bad port number in {s:?}"),
            })?;
            return Ok(Endpoint::Tcp(SocketAddr::from(([127, 0, 0, 1], port))));
        }

        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Endpoint::Tcp(addr));
        }

        Ok(Endpoint::Unix(PathBuf::from(s)))
    }
}

impl FromStr for Endpoint {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "{addr}"),
        }
    }
}

enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// A bound listener with its resolved endpoint.
pub(crate) struct Listener {
    kind: ListenerKind,
    endpoint: Endpoint,
}

impl Listener {
    pub(crate) async fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await.map_err(|e| BridgeError::Bind {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                })?;
                // Resolve an OS-assigned port to its concrete value.
                let local = listener.local_addr().map_err(|e| BridgeError::Bind {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Self {
                    kind: ListenerKind::Tcp(listener),
                    endpoint: Endpoint::Tcp(local),
                })
            }
            Endpoint::Unix(path) => Self::bind_unix(path).await,
        }
    }

    #[cfg(unix)]
    async fn bind_unix(path: &Path) -> Result<Self> {
        // A socket file left over from an unclean shutdown blocks the bind.
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed stale socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BridgeError::Bind {
                    endpoint: path.display().to_string(),
                    message: format!("could not remove stale socket file: {e}"),
                });
            }
        }

        let listener = UnixListener::bind(path).map_err(|e| BridgeError::Bind {
            endpoint: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            kind: ListenerKind::Unix(listener),
            endpoint: Endpoint::Unix(path.to_path_buf()),
        })
    }

    #[cfg(not(unix))]
    async fn bind_unix(path: &Path) -> Result<Self> {
        Err(BridgeError::Bind {
            endpoint: path.display().to_string(),
            message: "unix domain sockets are not supported on this platform".to_string(),
        })
    }

    /// Where this listener actually listens.
    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) async fn accept(&self) -> std::io::Result<Stream> {
        match &self.kind {
            ListenerKind::Tcp(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(Stream::Tcp(stream))
            }
            #[cfg(unix)]
            ListenerKind::Unix(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(Stream::Unix(stream))
            }
        }
    }
}

/// Remove whatever a bound endpoint left on disk.
///
/// Best-effort: a missing socket file is not an error, and a failed unlink
/// only costs the next bind a stale-file cleanup.
pub(crate) async fn cleanup(endpoint: &Endpoint) {
    if let Endpoint::Unix(path) = endpoint {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %path.display(), error = %e, "could not remove socket file"),
        }
    }
}

/// One connected byte stream in either transport family.
#[derive(Debug)]
pub(crate) enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    pub(crate) async fn connect(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await.map_err(|e| {
                    BridgeError::connection(format!("connect to {endpoint} failed: {e}"))
                })?;
                Ok(Stream::Tcp(stream))
            }
            Endpoint::Unix(path) => Self::connect_unix(path).await,
        }
    }

    #[cfg(unix)]
    async fn connect_unix(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).await.map_err(|e| {
            BridgeError::connection(format!("connect to {} failed: {e}", path.display()))
        })?;
        Ok(Stream::Unix(stream))
    }

    #[cfg(not(unix))]
    async fn connect_unix(path: &Path) -> Result<Self> {
        Err(BridgeError::connection(format!(
            "unix domain sockets are not supported on this platform ({})",
            path.display()
        )))
    }
}

// Both inner stream types are Unpin, so delegation needs no projection.

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
