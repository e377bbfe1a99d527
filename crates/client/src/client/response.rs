//! The response object handed back to callers.
//!
//! A [`Response`] owns the pooled socket it is being read from. Body bytes
//! are pulled lazily: each read drains already-decoded bytes first, then
//! feeds block-sized socket reads through the response decoder until the
//! caller is satisfied or the message completes. The socket slot is an
//! `Option` so release is idempotent; dropping an unreleased response always
//! discards the socket, since a dropped response may be mid-message.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode, Version};
use tokio::io::AsyncReadExt;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::codec::ResponseDecoder;
use crate::pool::{ConnectionPool, PooledSocket};
use crate::protocol::{BodyPlan, ClientError, Message, ParseError, PayloadItem, ResponseHead};

/// An HTTP response whose body can be read incrementally.
pub struct Response {
    pool: Arc<ConnectionPool>,
    socket: Option<PooledSocket>,
    decoder: ResponseDecoder,
    head: ResponseHead,
    /// Wire bytes read from the socket but not yet decoded.
    read_buf: BytesMut,
    /// Body bytes decoded but not yet handed to the caller.
    body_buf: BytesMut,
    /// Set when the connection must not be reused regardless of what the
    /// headers say: forbidden-body responses, bytes past the end of the
    /// message, or any read failure.
    dirty: bool,
    network_timeout: Duration,
    block_size: usize,
}

impl Response {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pool: Arc<ConnectionPool>,
        socket: PooledSocket,
        decoder: ResponseDecoder,
        head: ResponseHead,
        plan: BodyPlan,
        read_buf: BytesMut,
        network_timeout: Duration,
        block_size: usize,
    ) -> Result<Self, ClientError> {
        let mut response = Self {
            pool,
            socket: Some(socket),
            decoder,
            head,
            read_buf,
            body_buf: BytesMut::new(),
            dirty: plan.dirty,
            network_timeout,
            block_size,
        };

        // an empty body completes right away on whatever is buffered
        if let Err(e) = response.pump(false) {
            response.discard();
            return Err(e.into());
        }
        Ok(response)
    }

    /// The response status code.
    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    /// The response HTTP version.
    pub fn version(&self) -> Version {
        self.head.version()
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    /// A single header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|value| value.to_str().ok())
    }

    /// The parsed `Content-Length`, if present and valid.
    pub fn content_length(&self) -> Option<u64> {
        self.head.content_length()
    }

    /// The decoded head.
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// True once the whole message has been consumed from the wire.
    pub fn message_complete(&self) -> bool {
        self.decoder.message_complete()
    }

    /// Whether the connection can go back to the pool: the message was fully
    /// consumed, nothing marked the socket dirty, and protocol rules allow
    /// persistence.
    pub fn should_keep_alive(&self) -> bool {
        !self.dirty && self.decoder.message_complete() && self.head.keep_alive_by_protocol()
    }

    /// Whether the connection must be closed instead of reused.
    pub fn should_close(&self) -> bool {
        self.dirty || !self.decoder.message_complete() || !self.head.keep_alive_by_protocol()
    }

    /// Reads up to `n` body bytes.
    ///
    /// Suspends until `n` bytes are available or the message completes;
    /// returns an empty buffer once the body is exhausted.
    pub async fn read(&mut self, n: usize) -> Result<Bytes, ClientError> {
        self.fill_body(|buf| buf.len() >= n).await?;
        let take = n.min(self.body_buf.len());
        Ok(self.body_buf.split_to(take).freeze())
    }

    /// Reads body bytes up to and including `sep`.
    ///
    /// When the body ends before `sep` shows up, whatever remains is
    /// returned; an exhausted body yields an empty buffer.
    pub async fn readline(&mut self, sep: &[u8]) -> Result<Bytes, ClientError> {
        if sep.is_empty() {
            return self.body().await;
        }
        self.fill_body(|buf| find(buf, sep).is_some()).await?;
        match find(&self.body_buf, sep) {
            Some(idx) => Ok(self.body_buf.split_to(idx + sep.len()).freeze()),
            None => Ok(self.body_buf.split_to(self.body_buf.len()).freeze()),
        }
    }

    /// Reads the whole remaining body.
    pub async fn body(&mut self) -> Result<Bytes, ClientError> {
        self.fill_body(|_| false).await?;
        Ok(self.body_buf.split_to(self.body_buf.len()).freeze())
    }

    /// Returns the socket to the pool, or closes it when the release policy
    /// forbids reuse. Idempotent; also performed on drop (non-reusably).
    pub fn release(&mut self) {
        let reusable = !self.should_close();
        if let Some(socket) = self.socket.take() {
            debug!(reusable, "releasing response socket");
            self.pool.release(socket, reusable);
        }
    }

    /// Discards the socket unconditionally and poisons the response.
    fn discard(&mut self) {
        self.dirty = true;
        if let Some(socket) = self.socket.take() {
            self.pool.release(socket, false);
        }
    }

    /// Runs buffered wire bytes through the decoder, appending decoded body
    /// bytes. With `at_eof` the peer has closed and close-delimited bodies
    /// may complete.
    fn pump(&mut self, at_eof: bool) -> Result<(), ParseError> {
        while !self.decoder.message_complete() {
            let item = if at_eof {
                self.decoder.decode_eof(&mut self.read_buf)?
            } else {
                self.decoder.decode(&mut self.read_buf)?
            };
            match item {
                Some(Message::Payload(PayloadItem::Chunk(bytes))) => self.body_buf.extend_from_slice(&bytes),
                Some(_) => {}
                None => break,
            }
        }

        if self.decoder.message_complete() && !self.read_buf.is_empty() {
            warn!(extra = self.read_buf.len(), "bytes past the end of the message, socket will not be reused");
            self.dirty = true;
            self.read_buf.clear();
        }
        Ok(())
    }

    /// Feeds the decoder from the socket until `satisfied` holds on the
    /// decoded body bytes or the message completes.
    async fn fill_body(&mut self, satisfied: impl Fn(&[u8]) -> bool) -> Result<(), ClientError> {
        loop {
            if let Err(e) = self.pump(false) {
                self.discard();
                return Err(e.into());
            }
            if self.decoder.message_complete() || satisfied(&self.body_buf) {
                return Ok(());
            }

            let Some(socket) = self.socket.as_mut() else {
                // released mid-message; there is nothing left to read from
                return Err(ClientError::closed_before_body());
            };

            self.read_buf.reserve(self.block_size);
            let read = tokio::time::timeout(self.network_timeout, socket.transport_mut().read_buf(&mut self.read_buf)).await;
            let n = match read {
                Err(_) => {
                    self.discard();
                    return Err(ClientError::network_timeout("read", self.network_timeout.as_secs()));
                }
                Ok(Err(e)) => {
                    self.discard();
                    return Err(e.into());
                }
                Ok(Ok(n)) => n,
            };

            if n == 0 {
                if let Err(e) = self.pump(true) {
                    self.discard();
                    return Err(e.into());
                }
                if !self.decoder.message_complete() {
                    self.discard();
                    return Err(ClientError::closed_before_body());
                }
                return Ok(());
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status())
            .field("version", &self.version())
            .field("dirty", &self.dirty)
            .field("message_complete", &self.decoder.message_complete())
            .field("released", &self.socket.is_none())
            .finish()
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        // a dropped response may still be mid-message; its socket is never
        // returned to the pool
        if let Some(socket) = self.socket.take() {
            self.pool.release(socket, false);
        }
    }
}
