//! Line-level helpers shared by the header and chunked codecs.
//!
//! HTTP/1 framing is built from CRLF-terminated lines. Only the full `\r\n`
//! sequence ends a line; a bare `\n` is treated as line content. Helpers that
//! look for a line return `None` while the terminator has not arrived yet, so
//! callers can wait for more bytes without consuming anything.

use bytes::{Buf, BufMut, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::ensure;
use crate::protocol::ParseError;

pub(crate) const CRLF: &[u8] = b"\r\n";

/// Returns the position of the first `\r\n` in `src`.
#[inline]
pub(crate) fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|window| window == CRLF)
}

/// Splits one line off the front of `src`, dropping its terminator.
pub(crate) fn read_line(src: &mut BytesMut) -> Option<BytesMut> {
    let pos = find_crlf(src)?;
    let line = src.split_to(pos);
    src.advance(CRLF.len());
    Some(line)
}

/// Returns the length of a complete header block, including the empty line
/// that terminates it.
pub(crate) fn find_block_end(src: &[u8]) -> Option<usize> {
    if src.starts_with(CRLF) {
        return Some(CRLF.len());
    }
    src.windows(4).position(|window| window == b"\r\n\r\n").map(|pos| pos + 4)
}

/// Iterates the CRLF-terminated lines of `block` without their terminators.
pub(crate) fn lines(block: &[u8]) -> Lines<'_> {
    Lines { rest: block }
}

pub(crate) struct Lines<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let pos = find_crlf(self.rest)?;
        let line = &self.rest[..pos];
        self.rest = &self.rest[pos + CRLF.len()..];
        Some(line)
    }
}

/// Parses a `Key: Value` line.
///
/// The line is split at the first colon and both sides are trimmed.
pub(crate) fn parse_header_line(line: &[u8]) -> Result<(HeaderName, HeaderValue), ParseError> {
    let Some(colon) = line.iter().position(|b| *b == b':') else {
        return Err(ParseError::invalid_header(format!("missing colon in {:?}", String::from_utf8_lossy(line))));
    };

    let name = line[..colon].trim_ascii();
    ensure!(!name.is_empty(), ParseError::invalid_header("empty header name"));

    let name = HeaderName::from_bytes(name).map_err(ParseError::invalid_header)?;
    let value = HeaderValue::from_bytes(line[colon + 1..].trim_ascii()).map_err(ParseError::invalid_header)?;
    Ok((name, value))
}

/// Parses header lines into `headers` until the first empty line.
///
/// Repeated names are kept as separate values.
pub(crate) fn parse_headers<'a, I>(lines: I, max_headers: usize, headers: &mut HeaderMap) -> Result<(), ParseError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    for line in lines {
        if line.is_empty() {
            break;
        }
        ensure!(headers.len() < max_headers, ParseError::too_many_headers(max_headers));
        let (name, value) = parse_header_line(line)?;
        headers.append(name, value);
    }
    Ok(())
}

#[inline]
pub(crate) fn write_header(dst: &mut BytesMut, name: &[u8], value: &[u8]) {
    dst.reserve(name.len() + value.len() + 4);
    dst.put_slice(name);
    dst.put_slice(b": ");
    dst.put_slice(value);
    dst.put_slice(CRLF);
}

/// Writes every header as a `Key: Value` line, repeating the key for
/// multi-valued headers.
pub(crate) fn write_headers(dst: &mut BytesMut, headers: &HeaderMap) {
    for (name, value) in headers {
        write_header(dst, name.as_ref(), value.as_bytes());
    }
}
