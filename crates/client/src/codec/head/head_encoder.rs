//! HTTP request head encoder.
//!
//! Serializes a [`RequestHead`] into wire bytes: the request line, each
//! header in map iteration order, and the terminating blank line. Header
//! names keep the casing they were inserted with.

use crate::protocol::RequestHead;

use bytes::{BufMut, BytesMut};

use http::Version;
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size reserved for head serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for HTTP request heads implementing the [`Encoder`] trait.
#[derive(Debug)]
pub struct HeadEncoder;

impl Encoder<RequestHead> for HeadEncoder {
    type Error = io::Error;

    /// Encodes the request line and headers into the destination buffer.
    ///
    /// The caller is responsible for having set `Host` and `Content-Length`;
    /// the encoder writes exactly what the head holds.
    fn encode(&mut self, head: RequestHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);

        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported));
            }
        };

        write!(FastWrite(dst), "{} {} {}\r\n", head.method(), head.uri(), version)?;

        for (header_name, header_value) in head.headers().iter() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Fast writer onto BytesMut, skipping redundant bounds checks since the
/// space was reserved up front.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
