//! The public client API: configuration, request building, the pooled
//! request writer, and the per-target client map.
//!
//! [`HttpClient`] owns one [`ConnectionPool`](crate::pool::ConnectionPool)
//! for a single `(host, port, scheme)` target. Sending a request checks a
//! socket out of the pool, writes the head and body under the network
//! timeout, reads until the response head is complete, and hands the socket
//! over to the returned [`Response`], which reads the body lazily and
//! decides at release time whether the socket goes back to the pool.
//!
//! Requests that die to a stale pooled socket (peer reset, broken pipe, or
//! an immediate EOF on a reused connection) are retried on a fresh socket,
//! up to `pool_size + 1` attempts in total.

mod body;
mod client_pool;
mod config;
mod response;

pub use body::RequestBody;
pub use client_pool::ClientPool;
pub use config::{ClientConfig, Proxy};
pub use config::{DEFAULT_BLOCK_SIZE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_NETWORK_TIMEOUT, DEFAULT_POOL_SIZE, DEFAULT_USER_AGENT};
pub use response::Response;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderValue, Method, Request, Uri, Version, header};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::codec::{HeadEncoder, ResponseDecoder};
use crate::pool::{ConnectionPool, PooledSocket};
use crate::protocol::{BodyPlan, ClientError, Message, RequestHead, ResponseHead};
use crate::transport::{Connector, Transport, TlsContext};

/// An asynchronous HTTP/1.1 client for one upstream target.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct HttpClient {
    host: String,
    port: u16,
    config: ClientConfig,
    default_headers: HeaderMap,
    pool: Arc<ConnectionPool>,
}

impl HttpClient {
    /// Creates a client for `host:port` with the given configuration.
    ///
    /// TLS material is resolved here so misconfiguration fails fast rather
    /// than inside the first handshake.
    pub fn new(host: impl Into<String>, port: u16, config: ClientConfig) -> Result<Self, ClientError> {
        let host = host.into();

        let tls = if config.use_tls { Some(TlsContext::new(&config.tls)?) } else { None };

        // a plain-HTTP proxy takes over as the TCP target
        let (connect_host, connect_port) = match &config.proxy {
            Some(proxy) if !config.use_tls => (proxy.host.clone(), proxy.port),
            _ => (host.clone(), port),
        };
        let connector = Connector::new(connect_host, connect_port, config.connect_timeout, config.disable_ipv6, tls);
        let pool = Arc::new(ConnectionPool::new(connector, config.pool_size));

        let mut default_headers = config.default_headers.clone();
        if !default_headers.contains_key(header::USER_AGENT) {
            default_headers.insert(header::USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }

        Ok(Self { host, port, config, default_headers, pool })
    }

    /// Creates a client from an absolute `http` or `https` URI; the scheme
    /// selects TLS and the default port.
    pub fn from_uri(uri: &Uri, mut config: ClientConfig) -> Result<Self, ClientError> {
        let use_tls = match uri.scheme_str() {
            Some("http") | None => false,
            Some("https") => true,
            Some(_) => return Err(ClientError::invalid_target(uri)),
        };
        let host = uri.host().ok_or_else(|| ClientError::invalid_target(uri))?;
        let port = uri.port_u16().unwrap_or(if use_tls { 443 } else { 80 });

        config.use_tls = use_tls;
        Self::new(host, port, config)
    }

    /// The configured target host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured target port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Closes the connection pool. Idle sockets are dropped and further
    /// requests fail with [`ClientError::PoolClosed`].
    pub fn close(&self) {
        self.pool.close();
    }

    /// Sends a GET request.
    pub async fn get(&self, target: &str) -> Result<Response, ClientError> {
        self.request(Method::GET, target, HeaderMap::new(), RequestBody::Empty).await
    }

    /// Sends a HEAD request. The response never carries a body.
    pub async fn head(&self, target: &str) -> Result<Response, ClientError> {
        self.request(Method::HEAD, target, HeaderMap::new(), RequestBody::Empty).await
    }

    /// Sends a POST request with the given body.
    pub async fn post(&self, target: &str, body: impl Into<RequestBody>) -> Result<Response, ClientError> {
        self.request(Method::POST, target, HeaderMap::new(), body.into()).await
    }

    /// Sends a PUT request with the given body.
    pub async fn put(&self, target: &str, body: impl Into<RequestBody>) -> Result<Response, ClientError> {
        self.request(Method::PUT, target, HeaderMap::new(), body.into()).await
    }

    /// Sends a DELETE request.
    pub async fn delete(&self, target: &str) -> Result<Response, ClientError> {
        self.request(Method::DELETE, target, HeaderMap::new(), RequestBody::Empty).await
    }

    /// Sends a request and reads the response head.
    ///
    /// `target` is an origin-form path (`/search?q=x`) or an absolute URI
    /// matching this client's base. Headers are merged over the configured
    /// defaults, with the per-request side winning. The returned [`Response`]
    /// holds the socket until read to completion and released.
    pub async fn request(
        &self,
        method: Method,
        target: &str,
        headers: HeaderMap,
        mut body: RequestBody,
    ) -> Result<Response, ClientError> {
        let head = self.build_request(method, target, headers, &body)?;
        let bodyless_method = head.method() == Method::HEAD;

        let mut head_bytes = BytesMut::new();
        HeadEncoder.encode(head, &mut head_bytes)?;
        let head_bytes = head_bytes.freeze();

        // one extra attempt beyond the pool size: every idle socket may have
        // gone stale, and one fresh connect should still get through
        let max_attempts = if body.is_replayable() { self.config.pool_size + 1 } else { 1 };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut socket = self.pool.acquire().await?;
            let reused = socket.was_reused();

            match self.exchange(&mut socket, &head_bytes, &mut body, bodyless_method).await {
                Ok((head, plan, decoder, read_buf)) => {
                    return Response::new(
                        self.pool.clone(),
                        socket,
                        decoder,
                        head,
                        plan,
                        read_buf,
                        self.config.network_timeout,
                        self.config.block_size,
                    );
                }
                Err(e) => {
                    self.pool.release(socket, false);

                    let stale_eof =
                        reused && matches!(e, ClientError::ConnectionClosed { context: "before reading headers" });
                    if (e.is_stale_connection() || stale_eof) && attempt < max_attempts {
                        debug!(attempt, error = %e, "request failed on a stale socket, retrying");
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Writes one request and reads until the response head is complete.
    async fn exchange(
        &self,
        socket: &mut PooledSocket,
        head_bytes: &Bytes,
        body: &mut RequestBody,
        bodyless_method: bool,
    ) -> Result<(ResponseHead, BodyPlan, ResponseDecoder, BytesMut), ClientError> {
        let network_timeout = self.config.network_timeout;
        let transport = socket.transport_mut();

        write_timed(transport, head_bytes, network_timeout).await?;
        match body {
            RequestBody::Empty => {}
            RequestBody::Bytes(bytes) => write_timed(transport, bytes, network_timeout).await?,
            RequestBody::Stream { reader, .. } => {
                let mut block = vec![0u8; self.config.block_size];
                loop {
                    let n = reader.read(&mut block).await?;
                    if n == 0 {
                        break;
                    }
                    write_timed(transport, &block[..n], network_timeout).await?;
                }
            }
        }
        transport.flush().await?;

        let mut decoder = ResponseDecoder::new(bodyless_method);
        let mut read_buf = BytesMut::with_capacity(self.config.block_size);
        loop {
            if let Some(message) = decoder.decode(&mut read_buf)? {
                match message {
                    Message::Header((head, plan)) => return Ok((head, plan, decoder, read_buf)),
                    // the decoder always yields the head first
                    Message::Payload(_) => continue,
                }
            }

            read_buf.reserve(self.config.block_size);
            let n = tokio::time::timeout(network_timeout, transport.read_buf(&mut read_buf))
                .await
                .map_err(|_| ClientError::network_timeout("read", network_timeout.as_secs()))?
                .map_err(ClientError::from)?;
            if n == 0 {
                return Err(ClientError::closed_before_headers());
            }
        }
    }

    /// Builds the request head: target normalization, header merging, and
    /// the automatic `Host` and `Content-Length` fields.
    fn build_request(
        &self,
        method: Method,
        target: &str,
        headers: HeaderMap,
        body: &RequestBody,
    ) -> Result<RequestHead, ClientError> {
        let relative = self.normalize_target(target)?;

        // proxied plain-HTTP requests carry the absolute form
        let wire_target = if self.config.proxy.is_some() && !self.config.use_tls {
            format!("{}{relative}", self.base_url())
        } else {
            relative
        };
        let uri: Uri = wire_target.parse().map_err(|_| ClientError::invalid_target(target))?;

        let mut merged = self.default_headers.clone();
        for name in headers.keys() {
            merged.remove(name);
        }
        for (name, value) in headers.iter() {
            merged.append(name.clone(), value.clone());
        }

        if self.config.version == Version::HTTP_11 && !merged.contains_key(header::HOST) {
            let value = HeaderValue::from_str(&self.host_header_value())
                .map_err(|_| ClientError::invalid_target(&self.host))?;
            merged.insert(header::HOST, value);
        }

        if !merged.contains_key(header::CONTENT_LENGTH) {
            if let Some(length) = body.length() {
                merged.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
        }

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = self.config.version;
        *request.headers_mut() = merged;
        Ok(request.into())
    }

    /// Reduces the caller's target to origin-form.
    ///
    /// Absolute targets must match this client's base URL, with or without
    /// an explicit default port; anything else is rejected rather than
    /// silently sent to the wrong host.
    fn normalize_target(&self, target: &str) -> Result<String, ClientError> {
        if target.starts_with('/') || target == "*" {
            return Ok(target.to_string());
        }

        if target.starts_with("http://") || target.starts_with("https://") {
            for base in [self.base_url(), format!("{}://{}:{}", self.scheme(), self.bracketed_host(), self.port)] {
                if let Some(rest) = target.strip_prefix(&base) {
                    if rest.is_empty() {
                        return Ok("/".to_string());
                    }
                    if rest.starts_with('/') || rest.starts_with('?') {
                        return Ok(rest.to_string());
                    }
                }
            }
            warn!(target, base = %self.base_url(), "absolute request target does not match the client base");
        }

        Err(ClientError::invalid_target(target))
    }

    fn scheme(&self) -> &'static str {
        if self.config.use_tls { "https" } else { "http" }
    }

    fn default_port(&self) -> u16 {
        if self.config.use_tls { 443 } else { 80 }
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// The `Host` header value: bracketed for IPv6 literals, port elided
    /// when it is the default for the scheme.
    fn host_header_value(&self) -> String {
        let host = self.bracketed_host();
        if self.port == self.default_port() { host } else { format!("{host}:{}", self.port) }
    }

    fn base_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.host_header_value())
    }
}

async fn write_timed(transport: &mut Transport, bytes: &[u8], timeout: std::time::Duration) -> Result<(), ClientError> {
    tokio::time::timeout(timeout, transport.write_all(bytes))
        .await
        .map_err(|_| ClientError::network_timeout("write", timeout.as_secs()))?
        .map_err(ClientError::from)
}
