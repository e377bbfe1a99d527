//! Decoder for bodies delimited by connection close.
//!
//! HTTP/1.0 style responses (and any response without `Content-Length` or a
//! chunked `Transfer-Encoding` on a non-persistent connection) carry a body
//! that simply runs until the peer closes the socket. Everything read is body;
//! the end-of-stream signal is the message terminator.

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

/// A decoder for read-until-close response bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EofDecoder {
    finished: bool,
}

impl EofDecoder {
    pub fn new() -> Self {
        Self { finished: false }
    }
}

impl Decoder for EofDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let bytes = src.split_to(src.len()).freeze();
        trace!(len = bytes.len(), "read body bytes until eof");
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    /// Called once the peer has closed the stream: drains any buffered bytes
    /// and then completes the message. This close is a clean terminator, not
    /// an error.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            return self.decode(src);
        }
        self.finished = true;
        Ok(Some(PayloadItem::Eof))
    }
}
