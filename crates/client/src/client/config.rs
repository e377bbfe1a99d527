//! Client configuration.

use std::time::Duration;

use http::{HeaderMap, Version};

use crate::transport::TlsOptions;

/// Default number of sockets kept per upstream target.
pub const DEFAULT_POOL_SIZE: usize = 1;

/// Default budget for establishing a connection (resolution, TCP connect
/// and TLS handshake together).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default budget for a single network read or write on an established
/// connection.
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default size of one socket read while draining a response body.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// The `User-Agent` sent when the caller configures none.
pub const DEFAULT_USER_AGENT: &str = concat!("micro-client/", env!("CARGO_PKG_VERSION"));

/// An HTTP proxy the client should send its requests through.
///
/// Requests are rewritten to absolute form and the TCP connection targets
/// the proxy instead of the origin. Only plain-HTTP origins are supported;
/// tunneling TLS through a proxy is not.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
}

/// Configuration shared by every request a client sends.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum number of concurrently open sockets to the target.
    pub pool_size: usize,
    /// Budget for establishing one connection.
    pub connect_timeout: Duration,
    /// Budget for each read/write on an established connection.
    pub network_timeout: Duration,
    /// Skip IPv6 addresses during resolution.
    pub disable_ipv6: bool,
    /// Speak TLS to the target.
    pub use_tls: bool,
    /// TLS settings, consulted only when `use_tls` is set.
    pub tls: TlsOptions,
    /// Optional HTTP proxy.
    pub proxy: Option<Proxy>,
    /// HTTP version put on the request line. `HTTP/1.1` or `HTTP/1.0`.
    pub version: Version,
    /// Size of one socket read while draining a response body.
    pub block_size: usize,
    /// Headers merged into every request; per-request headers win.
    pub default_headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            disable_ipv6: false,
            use_tls: false,
            tls: TlsOptions::default(),
            proxy: None,
            version: Version::HTTP_11,
            block_size: DEFAULT_BLOCK_SIZE,
            default_headers: HeaderMap::new(),
        }
    }
}
