use std::io;
use thiserror::Error;

/// Errors raised while establishing a connection to the upstream.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to resolve {host}:{port}: {reason}")]
    Resolution { host: String, port: u16, reason: String },

    #[error("connect to {host}:{port} timed out after {timeout_secs}s")]
    ConnectTimeout { host: String, port: u16, timeout_secs: u64 },

    #[error("tls handshake with {host} failed: {reason}")]
    TlsHandshake { host: String, reason: String },

    #[error("tls is not usable: {reason}")]
    TlsUnavailable { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ConnectError {
    pub fn resolution<S: ToString>(host: &str, port: u16, reason: S) -> Self {
        Self::Resolution { host: host.to_string(), port, reason: reason.to_string() }
    }

    pub fn connect_timeout(host: &str, port: u16, timeout_secs: u64) -> Self {
        Self::ConnectTimeout { host: host.to_string(), port, timeout_secs }
    }

    pub fn tls_handshake<S: ToString>(host: &str, reason: S) -> Self {
        Self::TlsHandshake { host: host.to_string(), reason: reason.to_string() }
    }

    pub fn tls_unavailable<S: ToString>(reason: S) -> Self {
        Self::TlsUnavailable { reason: reason.to_string() }
    }
}

/// Errors raised while decoding an HTTP response from the wire.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid status line: {reason}")]
    InvalidStatusLine { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid chunked body: {reason}")]
    InvalidChunk { reason: String },

    #[error("unexpected bytes after message completed")]
    MessageAfterComplete,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn invalid_status_line<S: ToString>(reason: S) -> Self {
        Self::InvalidStatusLine { reason: reason.to_string() }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(reason: S) -> Self {
        Self::InvalidChunk { reason: reason.to_string() }
    }
}

/// Top level error type surfaced by [`crate::client::HttpClient`].
///
/// Callers see exactly one variant per failure category; a response object is
/// only handed back once its head has been fully parsed.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect error: {source}")]
    Connect {
        #[from]
        source: ConnectError,
    },

    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("network {operation} timed out after {timeout_secs}s")]
    NetworkTimeout { operation: &'static str, timeout_secs: u64 },

    #[error("connection closed {context}")]
    ConnectionClosed { context: &'static str },

    #[error("connection pool closed")]
    PoolClosed,

    #[error("invalid request target: {target}")]
    InvalidTarget { target: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ClientError {
    pub fn network_timeout(operation: &'static str, timeout_secs: u64) -> Self {
        Self::NetworkTimeout { operation, timeout_secs }
    }

    pub fn closed_before_headers() -> Self {
        Self::ConnectionClosed { context: "before reading headers" }
    }

    pub fn closed_before_body() -> Self {
        Self::ConnectionClosed { context: "before reading body" }
    }

    pub fn invalid_target<S: ToString>(target: S) -> Self {
        Self::InvalidTarget { target: target.to_string() }
    }

    /// Whether this error was caused by a peer reset or broken pipe, the two
    /// conditions the request writer retries on a fresh socket.
    pub fn is_stale_connection(&self) -> bool {
        match self {
            Self::Io { source } => {
                matches!(source.kind(), io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe)
            }
            _ => false,
        }
    }
}
