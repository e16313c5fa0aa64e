//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! This module provides functionality to decode HTTP messages that use chunked transfer encoding
//! as specified in [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//!
//! The chunked encoding allows the sender to transmit message data in a series of chunks,
//! indicating the size of each chunk before its data. Trailer fields that follow the last
//! chunk are collected and can be taken once the payload is finished.

use crate::codec::header::lines::{CRLF, parse_header_line, read_line};
use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};
use http::HeaderMap;
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::*;

/// Longest chunk size or trailer line accepted.
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Most trailer fields accepted after the last chunk.
const MAX_TRAILERS: usize = 64;

/// A decoder for handling HTTP chunked transfer encoding.
///
/// The decoder processes incoming bytes according to the chunked format:
/// - Each chunk starts with its size in hexadecimal
/// - Followed by optional extensions and CRLF
/// - Then the chunk data and CRLF
/// - A zero-sized chunk indicates the end of the message
/// - Optional trailer fields, then an empty line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    trailers: Option<HeaderMap>,
}

impl ChunkedDecoder {
    /// Creates a new ChunkedDecoder instance.
    ///
    /// The decoder starts in the Size state, ready to read the size of the first chunk.
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0, trailers: None }
    }

    /// Takes the trailer fields received after the last chunk.
    pub fn take_trailers(&mut self) -> Option<HeaderMap> {
        self.trailers.take()
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size line
    Size,
    /// Read chunk data
    Body,
    /// Read the CRLF after chunk data
    BodyCrlf,
    /// Read trailer fields until the empty line
    Trailer,
    /// Final state after the empty line
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes chunked transfer encoded data from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(PayloadItem::Chunk(bytes)))` when a chunk is successfully decoded
    /// - `Ok(Some(PayloadItem::Eof))` when the final chunk and trailers are processed
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the chunked encoding is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                // need more data
                return Ok(None);
            }

            let mut buf = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut self.trailers, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

/// Parses a chunk size written in hexadecimal.
///
/// Both cases are accepted. An empty size or any non-hex byte is an error.
pub(crate) fn parse_hex(v: &[u8]) -> Result<u64, ParseError> {
    if v.is_empty() {
        return Err(ParseError::invalid_chunk("empty chunk size"));
    }

    let mut n: u64 = 0;
    for b in v {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(ParseError::invalid_chunk("invalid byte in chunk length")),
        };
        n = n
            .checked_mul(16)
            .and_then(|n| n.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_chunk("invalid overflow chunked length"))?;
    }
    Ok(n)
}

/// Splits the next line off `src`, or waits for it while it stays within the line limit.
fn next_line(src: &mut BytesMut, what: &str) -> Poll<Result<BytesMut, ParseError>> {
    match read_line(src) {
        Some(line) if line.len() > MAX_LINE_BYTES => Poll::Ready(Err(ParseError::invalid_chunk(format!("{what} too long")))),
        Some(line) => Poll::Ready(Ok(line)),
        None if src.len() > MAX_LINE_BYTES => Poll::Ready(Err(ParseError::invalid_chunk(format!("{what} too long")))),
        None => Poll::Pending,
    }
}

macro_rules! try_ready {
    ($e:expr) => {
        match $e {
            Poll::Ready(Ok(value)) => value,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        }
    };
}

impl ChunkedState {
    /// Processes the next step in the chunked decoding state machine.
    fn step(
        self,
        src: &mut BytesMut,
        remaining_size: &mut u64,
        trailers: &mut Option<HeaderMap>,
        buf: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        match self {
            Size => ChunkedState::read_size(src, remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, buf),
            BodyCrlf => ChunkedState::read_body_crlf(src),
            Trailer => ChunkedState::read_trailer(src, trailers),
            End => Poll::Ready(Ok(End)),
        }
    }

    /// Reads the chunk size line.
    ///
    /// Chunk extensions after `;` are ignored, as is whitespace around the size.
    /// A zero size moves on to the trailer section.
    fn read_size(src: &mut BytesMut, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        let line = try_ready!(next_line(src, "chunk size line"));

        let size = match line.iter().position(|b| *b == b';') {
            Some(pos) => &line[..pos],
            None => &line[..],
        };

        *size_per_chunk = match parse_hex(size.trim_ascii()) {
            Ok(size) => size,
            Err(e) => return Poll::Ready(Err(e)),
        };

        if *size_per_chunk == 0 { Poll::Ready(Ok(Trailer)) } else { Poll::Ready(Ok(Body)) }
    }

    /// Reads up to `size_per_chunk` bytes of chunk data.
    fn read_body(src: &mut BytesMut, size_per_chunk: &mut u64, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        if src.is_empty() {
            return Poll::Pending;
        }

        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCrlf));
        }

        // cap remaining bytes at the max capacity of usize
        let remaining = usize::try_from(*size_per_chunk).unwrap_or(usize::MAX);
        let read_size = std::cmp::min(remaining, src.len());

        *size_per_chunk -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if *size_per_chunk > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCrlf)) }
    }

    /// Validates the CRLF that closes chunk data.
    fn read_body_crlf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        if src.len() < CRLF.len() {
            if src.first().is_some_and(|b| *b != b'\r') {
                return Poll::Ready(Err(ParseError::invalid_chunk("missing CRLF after chunk data")));
            }
            return Poll::Pending;
        }

        if &src[..CRLF.len()] != CRLF {
            return Poll::Ready(Err(ParseError::invalid_chunk("missing CRLF after chunk data")));
        }
        src.advance(CRLF.len());
        Poll::Ready(Ok(Size))
    }

    /// Reads one trailer field, or the empty line that ends the payload.
    fn read_trailer(src: &mut BytesMut, trailers: &mut Option<HeaderMap>) -> Poll<Result<ChunkedState, ParseError>> {
        let line = try_ready!(next_line(src, "trailer line"));
        if line.is_empty() {
            return Poll::Ready(Ok(End));
        }

        match parse_header_line(&line) {
            Ok((name, value)) => {
                let trailers = trailers.get_or_insert_with(HeaderMap::new);
                if trailers.len() >= MAX_TRAILERS {
                    return Poll::Ready(Err(ParseError::invalid_chunk(format!("more than {MAX_TRAILERS} trailer fields"))));
                }
                trailers.append(name, value);
                Poll::Ready(Ok(Trailer))
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}
