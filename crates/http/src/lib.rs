//! An asynchronous HTTP/1.x client wire engine
//!
//! This crate drives a single, already established transport as an HTTP/1.x
//! client connection. It serializes requests, parses responses, applies
//! chunked and fixed-length framing, and matches pipelined responses back to
//! the requests that asked for them. Dialing, TLS, pooling and retries belong
//! to the caller: the engine only needs an `AsyncRead`/`AsyncWrite` pair.
//!
//! # Features
//!
//! - HTTP/1.0 and HTTP/1.1 with keep-alive and pipelining
//! - Streaming request and response bodies through `http_body::Body`
//! - Chunked transfer encoding, including response trailers
//! - Protocol upgrades and `CONNECT` tunnels as raw byte streams
//! - Host normalization (IDNA, IPv6 zones) and caller-controlled header order
//! - One recorded cause per connection teardown, visible to every operation
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::Request;
//! use http_body_util::{BodyExt, Empty};
//! use micro_h1::connection::ClientConnection;
//! use tokio::net::TcpStream;
//! use tracing::{info, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber)?;
//!
//!     let stream = TcpStream::connect("example.com:80").await?;
//!     let (reader, writer) = stream.into_split();
//!     let connection = ClientConnection::new(reader, writer);
//!
//!     let request = Request::get("http://example.com/").body(Empty::<Bytes>::new())?;
//!     let response = connection.send(request).await?;
//!     info!(status = %response.status(), "received response");
//!
//!     let body = response.into_body().collect().await?.to_bytes();
//!     info!(size = body.len(), "received body");
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into three modules:
//!
//! - [`connection`]: [`ClientConnection`](connection::ClientConnection), its
//!   response reading task, and upgraded streams
//! - [`protocol`]: Message types, the response body, cancellation scopes and errors
//! - [`codec`]: Streaming encoders and decoders for heads and payloads
//!
//! ## Bodies
//!
//! A response body is decoded only as it is read. Until it has been read to
//! the end or closed, the connection cannot deliver the next response. A body
//! closed early keeps the connection only if its remaining bytes are already
//! buffered.
//!
//! ## Error Handling
//!
//! - [`protocol::HttpError`]: Top-level error type
//! - [`protocol::ParseError`]: Response parsing errors
//! - [`protocol::SendError`]: Request sending errors
//!
//! # Limitations
//!
//! - HTTP/1.x only (HTTP/2 or HTTP/3 is not supported)
//! - No TLS: hand the engine an already secured stream
//! - Default maximum header block size: 64KB
//! - Default maximum number of headers: 100

pub mod codec;
pub mod connection;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
