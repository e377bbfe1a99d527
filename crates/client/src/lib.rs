//! An asynchronous pooled HTTP/1.1 client
//!
//! This crate provides a lightweight HTTP/1.1 client built on top of tokio.
//! Each client owns a bounded pool of connections to a single target and
//! parses responses incrementally, so bodies can be streamed without
//! buffering them whole.
//!
//! # Features
//!
//! - Bounded connection pool with LIFO socket reuse
//! - Incremental response parsing (fixed-length, chunked, and
//!   read-until-close bodies)
//! - Keep-alive handling with a conservative reuse policy
//! - Automatic `Host` and `Content-Length` headers
//! - TLS via rustls, with OS trust roots or a custom CA bundle
//! - Connect and per-operation network timeouts
//! - Retries over stale pooled sockets
//!
//! # Example
//!
//! ```no_run
//! use micro_client::client::{ClientConfig, HttpClient};
//! use std::error::Error;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     let client = HttpClient::new("example.com", 80, ClientConfig::default())?;
//!
//!     let mut response = client.get("/").await?;
//!     println!("status: {}", response.status());
//!
//!     let body = response.body().await?;
//!     println!("read {} body bytes", body.len());
//!
//!     // return the socket to the pool for the next request
//!     response.release();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`client`]: The public API: configuration, request building, the
//!   response object, and the per-target client map
//! - [`pool`]: The bounded connection pool
//! - [`codec`]: Request encoding and streaming response decoding
//! - [`transport`]: Address resolution, socket creation and TLS
//! - [`protocol`]: Protocol types and error taxonomy
//!
//! # Connection reuse
//!
//! A socket goes back to the pool only when the response was read to
//! completion, nothing marked the connection dirty, and HTTP version rules
//! allow persistence. Anything ambiguous (truncated messages, bytes past
//! the message boundary, bodyless responses that still declared framing)
//! closes the socket instead. A dropped, unreleased response never returns
//! its socket to the pool.
//!
//! # Limitations
//!
//! - HTTP/1.1 and HTTP/1.0 only
//! - No redirect following, cookie storage, or content decoding
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod client;
pub mod codec;
pub mod pool;
pub mod protocol;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
