//! HTTP response head handling implementation.
//!
//! This module provides the core abstraction for a decoded response head.
//! It wraps the standard `http::Response` type to provide the accessors and
//! the protocol-level keep-alive rule the client needs.

use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, Version, header};

/// Represents a decoded HTTP response head (status line and headers).
///
/// This struct wraps a `http::Response<()>` to provide:
/// - Access to status, version and header fields
/// - `Content-Length` extraction
/// - The HTTP/1.0 vs HTTP/1.1 persistence rule
#[derive(Debug)]
pub struct ResponseHead {
    inner: Response<()>,
}

impl AsRef<Response<()>> for ResponseHead {
    fn as_ref(&self) -> &Response<()> {
        &self.inner
    }
}

impl ResponseHead {
    /// Consumes the head and returns the inner `Response<()>`.
    pub fn into_inner(self) -> Response<()> {
        self.inner
    }

    /// Returns the response status code.
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Returns the response HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the response headers.
    ///
    /// Lookups are case-insensitive; repeated fields (`Set-Cookie` notably)
    /// are kept as separate entries reachable via `get_all`.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Returns the parsed `Content-Length` value, if present and valid.
    pub fn content_length(&self) -> Option<u64> {
        self.headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    }

    /// Whether protocol rules allow reusing the connection after this response.
    ///
    /// HTTP/1.1 defaults to persistent unless `Connection: close`; HTTP/1.0
    /// defaults to non-persistent unless `Connection: keep-alive`. The
    /// `Connection` header is scanned as a comma-separated token list.
    pub fn keep_alive_by_protocol(&self) -> bool {
        match self.version() {
            Version::HTTP_11 => !self.has_connection_token("close"),
            Version::HTTP_10 => self.has_connection_token("keep-alive"),
            _ => false,
        }
    }

    fn has_connection_token(&self, token: &str) -> bool {
        self.headers()
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|item| item.trim().eq_ignore_ascii_case(token))
    }
}

/// Converts response parts into a ResponseHead.
impl From<Parts> for ResponseHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Response::from_parts(parts, ()) }
    }
}

/// Converts a bodyless response into a ResponseHead.
impl From<Response<()>> for ResponseHead {
    #[inline]
    fn from(inner: Response<()>) -> Self {
        Self { inner }
    }
}
