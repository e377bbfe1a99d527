//! Request body representations.

use bytes::Bytes;
use tokio::io::AsyncRead;

/// The body attached to an outgoing request.
pub enum RequestBody {
    /// No body at all.
    Empty,
    /// A fully buffered body. Its length is used for the automatic
    /// `Content-Length` header and the body can be replayed on retry.
    Bytes(Bytes),
    /// A body streamed from a reader, copied to the socket block by block.
    ///
    /// When `length` is known it feeds the automatic `Content-Length`
    /// header; otherwise the caller must provide framing headers itself.
    /// A streamed body cannot be replayed, so requests carrying one are
    /// never retried.
    Stream { reader: Box<dyn AsyncRead + Send + Unpin>, length: Option<u64> },
}

impl RequestBody {
    /// The number of bytes this body will put on the wire, when known.
    pub fn length(&self) -> Option<u64> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Bytes(bytes) => Some(bytes.len() as u64),
            RequestBody::Stream { length, .. } => *length,
        }
    }

    /// Whether the body can be written again after a failed attempt.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, RequestBody::Stream { .. })
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RequestBody::Stream { length, .. } => f.debug_struct("Stream").field("length", length).finish(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(bytes.into())
    }
}

impl From<&'static str> for RequestBody {
    fn from(s: &'static str) -> Self {
        RequestBody::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(s.into())
    }
}
