//! HTTP codec module: request encoding and streaming response decoding.
//!
//! The codecs are plain state machines over byte buffers; they own no
//! socket and do no IO. The client layer feeds them from the transport and
//! interprets the emitted [`crate::protocol::Message`] events.
//!
//! - [`HeadEncoder`] (via [`head`]): serializes a request head
//! - [`ResponseDecoder`]: head phase + payload phase response decoding
//! - Payload decoding strategies live in [`body`]

mod body;
mod head;
mod response_decoder;

pub use head::HeadDecoder;
pub use head::HeadEncoder;
pub use response_decoder::ResponseDecoder;
