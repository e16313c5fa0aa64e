//! HTTP header encoders for request and response heads
//!
//! The request encoder is what a client connection writes with. Before the
//! request line goes out it resolves the target host, fills in a missing
//! `Host` header and sets the framing header chosen for the body. Header lines
//! follow the [`HeaderOrder`] attached to the request, if any.
//!
//! The response encoder produces the server side of an exchange.

use crate::codec::header::lines::{CRLF, write_header, write_headers};
use crate::protocol::{HeaderOrder, PayloadSize, ReasonPhrase, RequestHeader, ResponseHead, SendError, normalize_host};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, Method, StatusCode, Version, header};
use std::io;
use std::io::Write;
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");

/// Encoder for HTTP request heads.
#[derive(Debug, Default)]
pub struct RequestHeaderEncoder;

impl Encoder<(RequestHeader, PayloadSize)> for RequestHeaderEncoder {
    type Error = SendError;

    /// Writes the request line, header lines and the blank line.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - HTTP version is neither HTTP/1.0 nor HTTP/1.1
    /// - The host cannot be converted to its ASCII form
    /// - The payload size asks for a close-delimited request body
    fn encode(&mut self, item: (RequestHeader, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        let version = version_str(header.version())?;

        let host = request_host(&header)?;
        if let Some(host) = &host {
            let value = HeaderValue::from_str(host).map_err(SendError::invalid_host)?;
            header.headers_mut().insert(header::HOST, value);
        }

        let headers = header.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => {
                headers.insert(header::CONTENT_LENGTH, n.into());
                headers.remove(header::TRANSFER_ENCODING);
            }
            PayloadSize::Chunked => {
                headers.insert(header::TRANSFER_ENCODING, CHUNKED);
                headers.remove(header::CONTENT_LENGTH);
            }
            PayloadSize::Empty => {}
            PayloadSize::UntilClose => {
                return Err(SendError::invalid_body("request body cannot be delimited by closing the connection"));
            }
        }

        dst.reserve(INIT_HEADER_SIZE);
        let target = request_target(&header, host.as_deref());
        write!(FastWrite(dst), "{} {} {}\r\n", header.method(), target, version)?;

        match header.extensions().get::<HeaderOrder>() {
            Some(order) => {
                for (name, value) in order.apply(header.headers()) {
                    write_header(dst, name.as_bytes(), value.as_bytes());
                }
            }
            None => write_headers(dst, header.headers()),
        }
        dst.put_slice(CRLF);
        Ok(())
    }
}

/// Encoder for HTTP response heads implementing the [`Encoder`] trait.
///
/// This encoder serializes a [`ResponseHead`] and [`PayloadSize`] into raw bytes,
/// automatically handling Content-Length or Transfer-Encoding headers based on the
/// payload size.
#[derive(Debug, Default)]
pub struct ResponseHeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for ResponseHeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        let version = version_str(header.version())?;
        let status = header.status();
        write!(FastWrite(dst), "{} {} ", version, status.as_str())?;
        match header.extensions().get::<ReasonPhrase>() {
            Some(reason) => dst.put_slice(reason.as_bytes()),
            None => dst.put_slice(status.canonical_reason().unwrap_or_default().as_bytes()),
        }
        dst.put_slice(CRLF);

        let bodiless = status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED;
        let headers = header.headers_mut();
        match payload_size {
            _ if bodiless => {}
            PayloadSize::Length(n) => {
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                headers.insert(header::TRANSFER_ENCODING, CHUNKED);
            }
            PayloadSize::Empty => {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
            PayloadSize::UntilClose => {
                headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
        }

        write_headers(dst, header.headers());
        dst.put_slice(CRLF);
        Ok(())
    }
}

fn version_str(version: Version) -> Result<&'static str, SendError> {
    match version {
        Version::HTTP_11 => Ok("HTTP/1.1"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        v => {
            error!(http_version = ?v, "unsupported http version");
            Err(SendError::UnsupportedVersion(v))
        }
    }
}

/// The normalized host a request is sent to.
///
/// An explicit `Host` header wins over the authority of the target URI.
fn request_host(header: &RequestHeader) -> Result<Option<String>, SendError> {
    match header.headers().get(header::HOST) {
        Some(value) => normalize_host(&String::from_utf8_lossy(value.as_bytes())).map(Some),
        None => header.uri().authority().map(|authority| normalize_host(authority.as_str())).transpose(),
    }
}

/// The request target written on the request line.
///
/// `CONNECT` requests without a path address the host itself.
fn request_target<'a>(header: &'a RequestHeader, host: Option<&'a str>) -> &'a str {
    let path_and_query = header.uri().path_and_query().map(http::uri::PathAndQuery::as_str);

    if header.method() == Method::CONNECT {
        return match path_and_query {
            Some(target) if target != "/" => target,
            _ => host.unwrap_or("/"),
        };
    }

    path_and_query.unwrap_or("/")
}

/// Fast writer implementation for writing to BytesMut.
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
