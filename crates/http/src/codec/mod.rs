//! HTTP codec module for encoding and decoding HTTP/1.x messages
//!
//! This module turns message heads and payload items into bytes and back. Every
//! codec is a streaming state machine implementing the `tokio_util` [`Decoder`]
//! or [`Encoder`] trait, so it can sit under a `FramedRead` or be driven over a
//! plain `BytesMut`.
//!
//! # Architecture
//!
//! - Client side:
//!   - [`RequestEncoder`]: Writes outgoing requests
//!   - [`ResponseDecoder`]: Reads incoming responses
//!
//! - Server side, used to play the peer in tests:
//!   - [`RequestDecoder`]: Reads requests
//!   - [`ResponseEncoder`]: Writes responses
//!
//! Head handling lives in [`header`], payload framing in [`body`].
//!
//! # Example
//!
//! ```no_run
//! use micro_h1::codec::{RequestEncoder, ResponseDecoder};
//! use micro_h1::protocol::{Message, PayloadSize, RequestHeader};
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::{Bytes, BytesMut};
//!
//! let request = http::Request::get("http://example.com/").body(()).unwrap();
//! let mut encoder = RequestEncoder::new();
//! let mut out = BytesMut::new();
//! encoder
//!     .encode(Message::<_, Bytes>::Header((RequestHeader::from(request), PayloadSize::Empty)), &mut out)
//!     .unwrap();
//!
//! let mut decoder = ResponseDecoder::new();
//! let mut input = BytesMut::from(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);
//! let response = decoder.decode(&mut input);
//! ```
//!
//! [`Decoder`]: tokio_util::codec::Decoder
//! [`Encoder`]: tokio_util::codec::Encoder

pub mod body;
pub mod header;
mod request_decoder;
mod request_encoder;
mod response_decoder;
mod response_encoder;

pub use header::HeaderLimits;
pub use request_decoder::RequestDecoder;
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
pub use response_encoder::ResponseEncoder;
