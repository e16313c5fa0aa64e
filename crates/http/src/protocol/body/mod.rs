//! HTTP response body handling implementation.
//!
//! A response body is read lazily: the caller pulls frames from [`RespBody`],
//! and the connection's read loop decodes each one off the transport only when
//! it is asked for. The two sides meet over channels.
//!
//! # Architecture
//!
//! - [`RespBody`]: The consumer side, implementing `http_body::Body`
//! - `BodySender`: The producer side, owned by the read loop while a body is open
//!
//! The body asks for a frame by sending a oneshot sender over an mpsc channel,
//! and the read loop answers it with the next data frame, the trailers, or the
//! end of the body. Each body also owns a child [`CancelScope`] of its
//! connection. Closing the body cancels that scope, which hands the transport
//! back to the read loop; tearing down the connection cancels it from above.
//!
//! When a body is released before it was read to the end, the read loop checks
//! whether the rest is already buffered. If it is not, the connection can no
//! longer find the start of the next response and is closed with
//! [`HttpError::BodyNotConsumed`].
//!
//! [`CancelScope`]: crate::protocol::CancelScope
//! [`HttpError::BodyNotConsumed`]: crate::protocol::HttpError::BodyNotConsumed

mod body_channel;
mod resp_body;

pub(crate) use body_channel::{BodyReply, BodySender};
pub use resp_body::RespBody;
