//! HTTP/1.x client connection handling
//!
//! This module drives one established transport through a sequence of
//! request/response exchanges.
//!
//! # Components
//!
//! - [`ClientConnection`]: The caller's handle. It writes requests and waits
//!   for their responses.
//! - The read loop: one task per connection that decodes responses and hands
//!   each one to the oldest request still waiting, then serves its body.
//! - [`Upgraded`]: The raw stream left after a `101 Switching Protocols`
//!   response or a successful `CONNECT`.
//! - [`Http1Config`]: Buffer sizes, header limits and queue depth.
//!
//! # Lifecycle
//!
//! A connection is torn down exactly once. The first cause wins: a parse
//! error, a failed write, the peer hanging up, a body closed with an error or
//! left half read, or an explicit [`ClientConnection::close`]. Teardown
//! cancels the root [`CancelScope`](crate::protocol::CancelScope), which stops
//! the read loop, fails every waiting request and every open body, and shuts
//! the write half down.

mod client_connection;
mod config;
mod handle;
mod message_writer;
mod read_loop;
mod upgrade;

pub use client_connection::{ClientConnection, ClientConnectionBuilder, RequestOptions};
pub use config::Http1Config;
pub(crate) use handle::ConnectionHandle;
pub use handle::{CloseHook, ConnectionId};
pub use message_writer::MessageWriter;
pub use upgrade::Upgraded;
