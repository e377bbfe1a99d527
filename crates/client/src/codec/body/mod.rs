//! Response body decoding.
//!
//! - [`chunked_decoder::ChunkedDecoder`]: chunked transfer encoded payloads (RFC 7230 §4.1)
//! - [`length_decoder::LengthDecoder`]: `Content-Length` framed payloads
//! - [`eof_decoder::EofDecoder`]: payloads delimited by connection close
//! - [`PayloadDecoder`]: dispatcher selected from the response head

mod chunked_decoder;
mod eof_decoder;
mod length_decoder;
mod payload_decoder;

pub use payload_decoder::PayloadDecoder;
