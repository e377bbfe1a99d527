//! Transport layer: address resolution, socket creation and the
//! plain-or-TLS stream type.
//!
//! The [`Connector`] is the pool's socket factory. It resolves the target
//! host, tries each candidate address in resolver order under a single
//! connect-timeout budget, and optionally wraps the stream in a verified TLS
//! session.

mod tls;
pub use tls::TlsContext;
pub use tls::TlsOptions;

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace};

use crate::protocol::ConnectError;

/// Resolves a host/port into candidate socket addresses, in resolver order.
///
/// No retries happen at this layer; the connector walks the candidates.
pub async fn resolve(host: &str, port: u16, disable_ipv6: bool) -> Result<Vec<SocketAddr>, ConnectError> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ConnectError::resolution(host, port, e))?
        .filter(|addr| !disable_ipv6 || addr.is_ipv4())
        .collect::<Vec<_>>();

    if addrs.is_empty() {
        return Err(ConnectError::resolution(host, port, "no address found"));
    }

    trace!(host, port, count = addrs.len(), "resolved candidate addresses");
    Ok(addrs)
}

/// A connected stream socket, optionally TLS-wrapped.
#[derive(Debug)]
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// The local address of the underlying TCP socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Transport::Plain(stream) => stream.local_addr(),
            Transport::Tls(stream) => stream.get_ref().0.local_addr(),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Socket factory for one upstream target.
#[derive(Debug)]
pub struct Connector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    disable_ipv6: bool,
    tls: Option<TlsContext>,
}

impl Connector {
    pub fn new(
        host: String,
        port: u16,
        connect_timeout: Duration,
        disable_ipv6: bool,
        tls: Option<TlsContext>,
    ) -> Self {
        Self { host, port, connect_timeout, disable_ipv6, tls }
    }

    /// Creates a connected (and, for TLS targets, handshaken) transport.
    ///
    /// Resolution, TCP connect attempts and the TLS handshake all run under
    /// the connect-timeout budget. The first address that connects wins; if
    /// none does, the first error encountered is surfaced.
    pub async fn connect(&self) -> Result<Transport, ConnectError> {
        let timeout = self.connect_timeout;

        tokio::time::timeout(timeout, self.connect_inner())
            .await
            .map_err(|_| ConnectError::connect_timeout(&self.host, self.port, timeout.as_secs()))?
    }

    async fn connect_inner(&self) -> Result<Transport, ConnectError> {
        let addrs = resolve(&self.host, self.port, self.disable_ipv6).await?;

        let mut first_error: Option<io::Error> = None;
        let mut connected = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    debug!(%addr, "connected");
                    connected = Some(stream);
                    break;
                }
                Err(e) => {
                    trace!(%addr, error = %e, "connect attempt failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        let stream = match connected {
            Some(stream) => stream,
            // resolve() guarantees at least one candidate was tried
            None => return Err(first_error.unwrap().into()),
        };
        stream.set_nodelay(true).map_err(ConnectError::from)?;

        match &self.tls {
            None => Ok(Transport::Plain(stream)),
            Some(tls) => {
                let server_name = tls.server_name(&self.host)?;
                let tls_stream = tls
                    .connector()
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| ConnectError::tls_handshake(&self.host, e))?;
                debug!(host = %self.host, "tls handshake complete");
                Ok(Transport::Tls(Box::new(tls_stream)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn resolve_loopback() {
        let addrs = resolve("localhost", 80, false).await.unwrap();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|addr| addr.port() == 80));
    }

    #[tokio::test]
    async fn resolve_ipv4_only() {
        let addrs = resolve("localhost", 80, true).await.unwrap();
        assert!(addrs.iter().all(|addr| addr.is_ipv4()));
    }

    #[tokio::test]
    async fn resolve_unknown_host_fails() {
        let result = resolve("host.invalid", 80, false).await;
        assert!(matches!(result, Err(ConnectError::Resolution { .. })));
    }

    #[tokio::test]
    async fn connect_plain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = Connector::new("127.0.0.1".to_string(), port, Duration::from_secs(5), false, None);
        let transport = connector.connect().await.unwrap();
        assert!(matches!(transport, Transport::Plain(_)));
    }

    #[tokio::test]
    async fn connect_refused_surfaces_io_error() {
        // bind then drop to find a port that refuses connections
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = Connector::new("127.0.0.1".to_string(), port, Duration::from_secs(5), false, None);
        assert!(matches!(connector.connect().await, Err(ConnectError::Io { .. })));
    }
}
