//! Core protocol abstractions for the client.
//!
//! This module provides the building blocks shared by the codec, pool and
//! client layers:
//!
//! - **Message handling** ([`message`]): decoded message events
//!   - [`Message`]: either a response head or a payload item
//!   - [`PayloadItem`]: a body chunk or the end-of-message marker
//!   - [`PayloadSize`]: how the body is framed on the wire
//!
//! - **Response head** ([`response`]): [`ResponseHead`] with status, headers
//!   and the protocol-level keep-alive rule
//!
//! - **Error handling** ([`error`]): per-concern error enums
//!   - [`ConnectError`]: resolution, connect and TLS failures
//!   - [`ParseError`]: malformed HTTP framing
//!   - [`ClientError`]: the single error type callers observe

mod message;
pub use message::BodyPlan;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::ClientError;
pub use error::ConnectError;
pub use error::ParseError;
