//! Core HTTP protocol abstractions shared by the codecs and the connection.
//!
//! # Architecture
//!
//! - **Message Handling** ([`message`]): Core message types and payload processing
//!   - [`Message`]: Represents either a head or a payload chunk
//!   - [`PayloadItem`]: Handles individual payload chunks and EOF
//!   - [`PayloadSize`]: How a payload is framed on the wire
//!
//! - **Request Processing** ([`request`]): [`RequestHeader`] wraps an outgoing request head
//!
//! - **Response Processing** ([`response`]): [`ResponseHeader`] wraps a decoded
//!   response head, [`ReasonPhrase`] keeps non-canonical reason phrases
//!
//! - **Body Streaming** ([`body`]): [`RespBody`] hands response payloads to the caller
//!
//! - **Cancellation** ([`cancel`]): [`CancelScope`] ties bodies to their connection
//!
//! - **Request helpers**: [`HeaderOrder`] controls the order headers are written in,
//!   [`normalize_host`] prepares the `Host` value
//!
//! - **Error Handling** ([`error`]):
//!   - [`HttpError`]: Top-level error type
//!   - [`ParseError`]: Response parsing errors
//!   - [`SendError`]: Request sending errors

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ReasonPhrase;
pub use response::ResponseHead;
pub use response::ResponseHeader;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

mod cancel;
pub use cancel::CancelScope;

mod header_order;
pub use header_order::HeaderOrder;
pub use header_order::OrderedHeader;

mod host;
pub use host::normalize_host;
pub use host::punycode_host_port;
pub use host::remove_zone;

pub mod body;
pub use body::RespBody;
