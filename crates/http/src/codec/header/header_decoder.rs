//! HTTP header decoders for response and request heads.
//!
//! Both decoders wait until the complete header block (start line, header
//! fields and the terminating empty line) is buffered, then parse it in one
//! pass. A block that grows past the configured byte limit is rejected before
//! it completes.
//!
//! # Response heads
//!
//! The status line is split at its first space into protocol and remainder;
//! the remainder holds a numeric status code and an optional reason phrase.
//! The payload framing is then chosen in this order:
//!
//! 1. `1xx`, `204` and `304` responses never carry a body
//! 2. `Transfer-Encoding: chunked`
//! 3. `Content-Length` (zero means an empty body)
//! 4. A connection the server will close delimits the body
//! 5. Otherwise there is no body
//!
//! # Request heads
//!
//! The request line is split into method, target and protocol. A `CONNECT`
//! target that is not a path is read as an authority.

use bytes::{Bytes, BytesMut};
use http::{Method, Request, Response, StatusCode, Uri, Version, header};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::framing::{content_length, is_chunked};
use crate::codec::header::lines::{find_block_end, lines, parse_headers};
use crate::codec::header::HeaderLimits;
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, ReasonPhrase, RequestHeader, ResponseHeader};

/// Decoder for HTTP response heads implementing the [`Decoder`] trait.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaderDecoder {
    limits: HeaderLimits,
}

impl ResponseHeaderDecoder {
    pub fn new(limits: HeaderLimits) -> Self {
        Self { limits }
    }
}

impl Decoder for ResponseHeaderDecoder {
    type Item = (ResponseHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(block) = split_block(src, &self.limits)? else {
            return Ok(None);
        };

        let mut block_lines = lines(&block);
        let status_line = block_lines.next().unwrap_or_default();
        let (version, status, reason) = parse_status_line(status_line)?;

        let mut response = Response::new(());
        *response.status_mut() = status;
        *response.version_mut() = version;
        parse_headers(block_lines, self.limits.max_headers, response.headers_mut())?;

        if let Some(reason) = reason
            && status.canonical_reason().is_none_or(|canonical| canonical.as_bytes() != reason)
        {
            response.extensions_mut().insert(ReasonPhrase::from_bytes_unchecked(block.slice_ref(reason)));
        }

        let header = ResponseHeader::from(response);
        let payload_size = response_payload(&header)?;
        trace!(status = %header.status(), ?payload_size, "decoded response head");

        Ok(Some((header, payload_size)))
    }
}

/// Decoder for HTTP request heads implementing the [`Decoder`] trait.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaderDecoder {
    limits: HeaderLimits,
}

impl RequestHeaderDecoder {
    pub fn new(limits: HeaderLimits) -> Self {
        Self { limits }
    }
}

impl Decoder for RequestHeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(block) = split_block(src, &self.limits)? else {
            return Ok(None);
        };

        let mut block_lines = lines(&block);
        let request_line = block_lines.next().unwrap_or_default();
        let (method, uri, version) = parse_request_line(request_line)?;

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;
        parse_headers(block_lines, self.limits.max_headers, request.headers_mut())?;

        let header = RequestHeader::from(request);
        let payload_size = request_payload(&header)?;
        trace!(method = %header.method(), ?payload_size, "decoded request head");

        Ok(Some((header, payload_size)))
    }
}

/// Splits a complete header block off `src`, enforcing the size limit.
fn split_block(src: &mut BytesMut, limits: &HeaderLimits) -> Result<Option<Bytes>, ParseError> {
    match find_block_end(src) {
        Some(len) => {
            ensure!(len <= limits.max_bytes, ParseError::too_large_header(len, limits.max_bytes));
            Ok(Some(src.split_to(len).freeze()))
        }
        None => {
            ensure!(src.len() <= limits.max_bytes, ParseError::too_large_header(src.len(), limits.max_bytes));
            Ok(None)
        }
    }
}

/// Splits `line` at its first space.
fn split_space(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = line.iter().position(|b| *b == b' ')?;
    Some((&line[..pos], &line[pos + 1..]))
}

fn parse_status_line(line: &[u8]) -> Result<(Version, StatusCode, Option<&[u8]>), ParseError> {
    let Some((proto, rest)) = split_space(line) else {
        return Err(ParseError::invalid_status_line(line));
    };

    let rest = rest.trim_ascii_start();
    let (code, reason) = match split_space(rest) {
        Some((code, reason)) => (code, Some(reason.trim_ascii()).filter(|reason| !reason.is_empty())),
        None => (rest, None),
    };

    ensure!(code.len() == 3 && code.iter().all(u8::is_ascii_digit), ParseError::invalid_status_code(code));
    let status = StatusCode::from_bytes(code).map_err(|_| ParseError::invalid_status_code(code))?;
    let version = parse_version(proto)?;

    Ok((version, status, reason))
}

fn parse_request_line(line: &[u8]) -> Result<(Method, Uri, Version), ParseError> {
    let (method, rest) = split_space(line).ok_or_else(|| ParseError::invalid_request_line(line))?;
    let (target, proto) = split_space(rest).ok_or_else(|| ParseError::invalid_request_line(line))?;
    ensure!(!method.is_empty() && !target.is_empty(), ParseError::invalid_request_line(line));

    let method = Method::from_bytes(method).map_err(|_| ParseError::InvalidMethod)?;
    let version = parse_version(proto)?;

    let uri = if method == Method::CONNECT && !target.starts_with(b"/") {
        let mut absolute = Vec::with_capacity(target.len() + 7);
        absolute.extend_from_slice(b"http://");
        absolute.extend_from_slice(target);
        Uri::try_from(absolute)
    } else {
        Uri::try_from(target)
    };

    Ok((method, uri.map_err(|_| ParseError::InvalidUri)?, version))
}

/// Parses an `HTTP/major.minor` protocol token.
///
/// Any HTTP/1 minor version beyond 1 is read as HTTP/1.1.
pub(crate) fn parse_version(proto: &[u8]) -> Result<Version, ParseError> {
    match proto {
        b"HTTP/1.1" => return Ok(Version::HTTP_11),
        b"HTTP/1.0" => return Ok(Version::HTTP_10),
        _ => {}
    }

    let digits = proto.strip_prefix(b"HTTP/").ok_or_else(|| ParseError::invalid_version(proto))?;
    let Some(dot) = digits.iter().position(|b| *b == b'.') else {
        return Err(ParseError::invalid_version(proto));
    };
    let (major, minor) = (&digits[..dot], &digits[dot + 1..]);
    ensure!(
        !major.is_empty() && !minor.is_empty() && major.iter().chain(minor).all(u8::is_ascii_digit),
        ParseError::invalid_version(proto)
    );

    match (major.trim_ascii_start(), minor.iter().all(|b| *b == b'0')) {
        (b"1", true) => Ok(Version::HTTP_10),
        (b"1", false) => Ok(Version::HTTP_11),
        (b"0", _) if minor == b"9" => Ok(Version::HTTP_09),
        _ => Err(ParseError::invalid_version(proto)),
    }
}

/// Determines how the body of a response is framed.
fn response_payload(header: &ResponseHeader) -> Result<PayloadSize, ParseError> {
    let status = header.status();
    if status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return Ok(PayloadSize::Empty);
    }

    if is_chunked(header.headers().get(header::TRANSFER_ENCODING)) {
        return Ok(PayloadSize::Chunked);
    }

    match content_length(header.headers())? {
        Some(0) => Ok(PayloadSize::Empty),
        Some(length) => Ok(PayloadSize::Length(length)),
        None if header.wants_close() => Ok(PayloadSize::UntilClose),
        None => Ok(PayloadSize::Empty),
    }
}

/// Determines how the body of a request is framed.
fn request_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    if is_chunked(header.headers().get(header::TRANSFER_ENCODING)) {
        return Ok(PayloadSize::Chunked);
    }

    match content_length(header.headers())? {
        Some(0) | None => Ok(PayloadSize::Empty),
        Some(length) => Ok(PayloadSize::Length(length)),
    }
}
