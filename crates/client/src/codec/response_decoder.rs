//! Two-phase HTTP response decoder.
//!
//! Phase one decodes the head with [`HeadDecoder`]; the body plan it yields
//! selects the payload decoder for phase two. The decoder also guards the
//! stream: once a message has completed, any further bytes mean the peer is
//! pipelining or the stream is poisoned, and decoding fails rather than
//! silently swallowing a second message.

use crate::codec::body::PayloadDecoder;
use crate::codec::head::HeadDecoder;
use crate::protocol::{BodyPlan, Message, ParseError, PayloadItem, ResponseHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A decoder for one HTTP response, head then payload.
///
/// # State machine
///
/// The phase is held in `payload_decoder`:
/// - `None`: decoding the head
/// - `Some(..)`: decoding the payload
///
/// `message_complete` is terminal; a fresh decoder is needed for the next
/// response on the same connection.
#[derive(Debug)]
pub struct ResponseDecoder {
    head_decoder: HeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
    message_begun: bool,
    headers_complete: bool,
    message_complete: bool,
}

impl ResponseDecoder {
    /// Creates a decoder for the response to a request. `bodyless_method`
    /// is set for HEAD requests, whose responses never carry a body.
    pub fn new(bodyless_method: bool) -> Self {
        Self {
            head_decoder: HeadDecoder::new(bodyless_method),
            payload_decoder: None,
            message_begun: false,
            headers_complete: false,
            message_complete: false,
        }
    }

    /// True once any response bytes have been seen. Distinguishes a socket
    /// that died before answering from one that died mid-response.
    pub fn message_begun(&self) -> bool {
        self.message_begun
    }

    /// True once the head has been fully parsed.
    pub fn headers_complete(&self) -> bool {
        self.headers_complete
    }

    /// True once the whole message (head and body) has been consumed.
    pub fn message_complete(&self) -> bool {
        self.message_complete
    }

    fn decode_inner(
        &mut self,
        src: &mut BytesMut,
        at_eof: bool,
    ) -> Result<Option<Message<(ResponseHead, BodyPlan)>>, ParseError> {
        if self.message_complete {
            if !src.is_empty() {
                return Err(ParseError::MessageAfterComplete);
            }
            return Ok(None);
        }
        if !src.is_empty() {
            self.message_begun = true;
        }

        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = if at_eof { payload_decoder.decode_eof(src)? } else { payload_decoder.decode(src)? };
            let message = match item {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    self.message_complete = true;
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.head_decoder.decode(src)? {
            Some((head, plan)) => {
                self.headers_complete = true;
                self.payload_decoder = Some(plan.payload.into());
                Some(Message::Header((head, plan)))
            }
            None => None,
        };

        Ok(message)
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, BodyPlan)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_inner(src, false)
    }

    /// Variant used once the peer has closed the stream. Read-until-close
    /// bodies complete here; anything else that is still mid-message is the
    /// caller's connection-closed error to raise.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_inner(src, true)
    }
}
