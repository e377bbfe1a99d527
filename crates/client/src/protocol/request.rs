//! HTTP request head handling implementation.
//!
//! This module wraps the standard `http::Request` type to represent the head
//! of an outgoing request: method, request target, version and headers. The
//! target is carried as an `http::Uri` and may be in origin-form (`/path?q`)
//! or absolute-form (proxied requests).

use http::{HeaderMap, Method, Request, Uri, Version};

/// Represents the head of an outgoing HTTP request.
#[derive(Debug)]
pub struct RequestHead {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHead {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHead {
    /// Consumes the head and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Returns a reference to the request method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns the request target.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Returns a mutable reference to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }
}

impl From<Request<()>> for RequestHead {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
