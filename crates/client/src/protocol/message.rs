use bytes::Bytes;

/// A decoded piece of an HTTP response stream: either the head or a payload item.
#[derive(Debug)]
pub enum Message<T> {
    /// The response head (status line and headers)
    Header(T),
    /// A chunk of payload data or the end-of-message marker
    Payload(PayloadItem),
}

/// An item in the response payload stream.
///
/// Produced by the payload decoders: either a chunk of body bytes or the
/// end of the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// A chunk of payload data
    Chunk(Bytes),
    /// Marks the end of the payload stream
    Eof,
}

/// How the response body is framed on the wire.
///
/// Resolved from the response head according to RFC 7230 section 3.3.3,
/// adjusted for the client-side special cases (HEAD requests, 1xx/204/304
/// statuses, and bodies terminated by connection close).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes (`Content-Length`)
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Payload runs until the peer closes the connection
    UntilEof,
    /// No payload (bodyless status or method, or zero length)
    Empty,
}

/// The body-handling decision taken once a response head is complete.
///
/// `dirty` records that the connection must not be reused even when header
/// level rules would permit it, e.g. a bodyless-by-protocol response whose
/// framing headers still declare a body the peer may go on to send.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BodyPlan {
    /// How the body (if any) is framed
    pub payload: PayloadSize,
    /// Force a connection close after this response
    pub dirty: bool,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the message has no payload at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Returns true if the payload is delimited by connection close
    #[inline]
    pub fn is_until_eof(&self) -> bool {
        matches!(self, PayloadSize::UntilEof)
    }
}

impl<T> Message<T> {
    /// Returns true if this message contains payload data
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    /// Returns true if this message contains the response head
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }
}

impl PayloadItem {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Returns a reference to the contained bytes if this is a chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    /// Consumes the item and returns the contained bytes if this is a chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
