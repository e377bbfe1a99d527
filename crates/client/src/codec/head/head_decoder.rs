//! HTTP response head decoder.
//!
//! Parses the status line and header block of a response using `httparse`,
//! then decides how the body is framed and whether the connection is still
//! trustworthy for reuse.
//!
//! The parse stage uses the index-based approach: header name/value byte
//! ranges are recorded against the original buffer so the final `HeaderMap`
//! is built without copying header data.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header section size: 8KB

use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Response, StatusCode, Version, header};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{BodyPlan, ParseError, PayloadSize, ResponseHead};

/// Maximum number of headers allowed in a response
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP response heads implementing the [`Decoder`] trait.
///
/// The decoder carries the two request-side facts body framing depends on:
/// whether the request method forbids a response body (HEAD), and whether
/// protocol rules would keep the connection alive when framing headers are
/// absent.
#[derive(Debug)]
pub struct HeadDecoder {
    /// The request method was HEAD: the response never has a body
    bodyless_method: bool,
}

impl HeadDecoder {
    pub fn new(bodyless_method: bool) -> Self {
        Self { bodyless_method }
    }
}

impl Decoder for HeadDecoder {
    type Item = (ResponseHead, BodyPlan);
    type Error = ParseError;

    /// Attempts to decode a response head from the buffer.
    ///
    /// Returns `Ok(None)` until the full head (terminated by the blank line)
    /// has arrived. The returned buffer has the head bytes consumed; body
    /// bytes that arrived in the same read stay in place.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Shortest possible head: "HTTP/1.1 200 \r\n\r\n"
        if src.len() < 17 {
            return Ok(None);
        }

        let mut resp = httparse::Response::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            [const { MaybeUninit::uninit() }; MAX_HEADER_NUM];

        let parsed_result = httparse::ParserConfig::default()
            .parse_response_with_uninit_headers(&mut resp, src, &mut headers)
            .map_err(|e| match e {
                Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
                Error::Status => ParseError::invalid_status_line("malformed status code"),
                Error::Version => ParseError::invalid_status_line("malformed http version"),
                e => ParseError::invalid_header(e.to_string()),
            });

        match parsed_result? {
            Status::Complete(head_size) => {
                trace!(head_size, "parsed response head");
                ensure!(head_size <= MAX_HEADER_BYTES, ParseError::too_large_header(head_size, MAX_HEADER_BYTES));

                let header_count = resp.headers.len();
                ensure!(header_count <= MAX_HEADER_NUM, ParseError::too_many_headers(header_count));

                // Record byte range indices for each header before the
                // borrow of src is released
                let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
                HeaderIndex::record(src, resp.headers, &mut header_index);

                let version = match resp.version {
                    Some(0) => Version::HTTP_10,
                    Some(1) => Version::HTTP_11,
                    v => return Err(ParseError::InvalidVersion(v)),
                };

                let code = resp.code.ok_or_else(|| ParseError::invalid_status_line("missing status code"))?;
                let status = StatusCode::from_u16(code)
                    .map_err(|_| ParseError::invalid_status_line(format!("status code {code} out of range")))?;

                let mut builder = Response::builder().status(status).version(version);

                let headers = builder.headers_mut().unwrap();
                headers.reserve(header_count);

                // Split the head off the source buffer; the index ranges
                // keep the header bytes alive without copies
                let head_bytes = src.split_to(head_size).freeze();
                for index in &header_index[..header_count] {
                    // httparse verified the name is valid ASCII
                    let name = HeaderName::from_bytes(&head_bytes[index.name.0..index.name.1]).unwrap();

                    // httparse verified the value holds only visible ASCII
                    let value = unsafe {
                        HeaderValue::from_maybe_shared_unchecked(head_bytes.slice(index.value.0..index.value.1))
                    };

                    // append keeps repeated fields (Set-Cookie) as separate entries
                    headers.append(name, value);
                }

                let head = ResponseHead::from(builder.body(()).unwrap());
                let plan = resolve_body_plan(&head, self.bodyless_method)?;

                Ok(Some((head, plan)))
            }
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}

/// Byte range positions of a header's name and value within the head buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let name_end = name_start + header.name.len();
            indices.name = (name_start, name_end);
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            let value_end = value_start + header.value.len();
            indices.value = (value_start, value_end);
        }
    }
}

/// Decides body framing and connection reusability once the head is parsed.
///
/// The rules, in order (RFC 7230 §3.3.3 plus the client-side exceptions):
///
/// 1. No `Content-Length` and no chunked `Transfer-Encoding`: the message has
///    no determinate body. When protocol rules already call for a close, the
///    body runs until EOF. When they call for keep-alive, an unframed body
///    over a persistent connection is unknowable, so the message completes
///    with no body and the connection is marked dirty (forced close).
/// 2. HEAD request, or status 1xx/204/304: a body is forbidden by protocol.
///    The message completes at the head, and since the peer declared framing
///    it may still push body bytes we will never read, so the connection is
///    marked dirty.
/// 3. Chunked `Transfer-Encoding` (chunked last): chunked body.
/// 4. `Content-Length: n`: fixed-length body.
///
/// Both `Content-Length` and `Transfer-Encoding` present is a parse error.
fn resolve_body_plan(head: &ResponseHead, bodyless_method: bool) -> Result<BodyPlan, ParseError> {
    let te_header = head.headers().get(header::TRANSFER_ENCODING);
    let cl_header = head.headers().get(header::CONTENT_LENGTH);

    if te_header.is_some() && cl_header.is_some() {
        return Err(ParseError::invalid_content_length("transfer-encoding and content-length both present"));
    }

    let chunked = is_chunked(te_header);

    let content_length = match cl_header {
        Some(value) => {
            let cl_str =
                value.to_str().map_err(|_| ParseError::invalid_content_length("value is not visible ascii"))?;
            let length = cl_str
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;
            Some(length)
        }
        None => None,
    };

    let bodyless = bodyless_method
        || head.status().is_informational()
        || head.status() == StatusCode::NO_CONTENT
        || head.status() == StatusCode::NOT_MODIFIED;

    // a zero Content-Length is the same as no declared body
    let declared_body = chunked || content_length.is_some_and(|n| n > 0);

    if !declared_body {
        if bodyless || content_length.is_some() {
            return Ok(BodyPlan { payload: PayloadSize::Empty, dirty: false });
        }
        if !head.keep_alive_by_protocol() {
            return Ok(BodyPlan { payload: PayloadSize::UntilEof, dirty: false });
        }
        // persistent connection with an unframed body: the length is
        // unknowable, complete with no body and refuse to reuse the socket
        return Ok(BodyPlan { payload: PayloadSize::Empty, dirty: true });
    }

    if bodyless {
        // the rfc forbids a body but the framing headers declare one; bytes
        // the peer still sends are never read, so the socket is poisoned
        return Ok(BodyPlan { payload: PayloadSize::Empty, dirty: true });
    }

    if chunked {
        return Ok(BodyPlan { payload: PayloadSize::Chunked, dirty: false });
    }

    // declared_body guarantees a positive content length here
    Ok(BodyPlan { payload: PayloadSize::Length(content_length.unwrap()), dirty: false })
}

/// Chunked applies only when it is the last encoding listed
/// (RFC 7230 §3.3.3).
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value {
        if let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next() {
            return bytes.trim_ascii() == CHUNKED;
        }
    }
    false
}
