//! HTTP response decoder module
//!
//! This module provides functionality for decoding HTTP responses using a streaming approach.
//! It handles both head parsing and payload decoding through a state machine pattern.
//!
//! # Components
//!
//! - [`ResponseDecoder`]: Main decoder that coordinates head and payload parsing
//! - Head parsing: Uses [`ResponseHeaderDecoder`] for the status line and headers
//! - Payload handling: Uses [`PayloadDecoder`] for the response body if any
//!
//! The framing chosen from the response head alone is not always right. A
//! response to `HEAD` never has a body whatever its headers say, and a
//! successful `CONNECT` turns the connection into a tunnel. The connection
//! corrects the framing through [`ResponseDecoder::override_payload`] once it
//! knows which request the response belongs to.
//!
//! # Example
//!
//! ```no_run
//! use micro_h1::codec::ResponseDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = ResponseDecoder::new();
//! let mut buffer = BytesMut::from(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);
//! let result = decoder.decode(&mut buffer);
//! ```

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{HeaderLimits, ResponseHeaderDecoder};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHeader};
use bytes::BytesMut;
use http::HeaderMap;
use std::io;
use tokio_util::codec::Decoder;

/// A decoder for HTTP responses that handles both heads and payload
///
/// The decoder maintains its state through the `payload_decoder` field:
/// - `None`: Currently parsing a response head
/// - `Some(PayloadDecoder)`: Currently parsing payload
///
/// Responses without a body go straight back to head parsing.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    header_decoder: ResponseHeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    trailers: Option<HeaderMap>,
}

impl ResponseDecoder {
    /// Creates a new `ResponseDecoder` with default header limits
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: HeaderLimits) -> Self {
        Self { header_decoder: ResponseHeaderDecoder::new(limits), payload_decoder: None, trailers: None }
    }

    /// Replaces the framing of the payload that follows the last decoded head.
    pub fn override_payload(&mut self, payload_size: PayloadSize) {
        self.payload_decoder = if payload_size.is_empty() { None } else { Some(payload_size.into()) };
    }

    /// Returns true while the payload of the last head is being decoded.
    pub fn in_payload(&self) -> bool {
        self.payload_decoder.is_some()
    }

    /// Takes the trailer fields of the last finished chunked payload.
    pub fn take_trailers(&mut self) -> Option<HeaderMap> {
        self.trailers.take()
    }

    /// Consumes what is left of the current payload from `src` without doing
    /// any I/O.
    ///
    /// Returns true if the payload is finished, false if more bytes would be
    /// needed from the connection.
    pub fn finish_buffered(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        while self.payload_decoder.is_some() {
            match self.decode(src)? {
                Some(Message::Payload(PayloadItem::Eof)) => return Ok(true),
                Some(_) => {}
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn payload_message(&mut self, item: Option<PayloadItem>) -> Option<Message<(ResponseHeader, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                // no need payload decoder in this response now
                if let Some(mut payload_decoder) = self.payload_decoder.take() {
                    self.trailers = payload_decoder.take_trailers();
                }
                Some(Message::Payload(item))
            }
            None => None,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHeader, PayloadSize)>;
    type Error = ParseError;

    /// Attempts to decode an HTTP response from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Message::Header(_)))`: Successfully decoded response head
    /// - `Ok(Some(Message::Payload(_)))`: Successfully decoded a payload chunk
    /// - `Ok(None)`: Need more data to proceed
    /// - `Err(_)`: Encountered a parsing error
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // parse payload if have payload_decoder
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.payload_message(item));
        }

        // parse response head
        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.trailers = None;
                self.override_payload(payload_size);
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.payload_message(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::io(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed inside a response head"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;

    fn next(decoder: &mut ResponseDecoder, buf: &mut BytesMut) -> Message<(ResponseHeader, PayloadSize)> {
        decoder.decode(buf).unwrap().unwrap()
    }

    fn chunk(message: Message<(ResponseHeader, PayloadSize)>) -> Bytes {
        message.into_payload_item().and_then(PayloadItem::into_bytes).unwrap()
    }

    #[test]
    fn pipelined_responses() {
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhelloHTTP/1.1 204 No Content\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"[..],
        );
        let mut decoder = ResponseDecoder::new();

        assert!(next(&mut decoder, &mut buf).is_header());
        assert_eq!(chunk(next(&mut decoder, &mut buf)), "hello");
        assert!(next(&mut decoder, &mut buf).into_payload_item().unwrap().is_eof());

        match next(&mut decoder, &mut buf) {
            Message::Header((header, size)) => {
                assert_eq!(header.status(), StatusCode::NO_CONTENT);
                assert!(size.is_empty());
            }
            Message::Payload(_) => panic!("expected a response head"),
        }
        assert!(!decoder.in_payload());

        assert!(next(&mut decoder, &mut buf).is_header());
        assert_eq!(chunk(next(&mut decoder, &mut buf)), "ok");
        assert!(next(&mut decoder, &mut buf).into_payload_item().unwrap().is_eof());
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn head_response_override() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nHTTP/1.1 200 OK\r\n\r\n"[..]);
        let mut decoder = ResponseDecoder::new();

        assert!(next(&mut decoder, &mut buf).is_header());
        assert!(decoder.in_payload());
        decoder.override_payload(PayloadSize::Empty);
        assert!(!decoder.in_payload());

        assert!(next(&mut decoder, &mut buf).is_header());
    }

    #[test]
    fn chunked_trailers_are_stashed() {
        let mut buf =
            BytesMut::from(&b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\nX-Checksum: 9\r\n\r\n"[..]);
        let mut decoder = ResponseDecoder::new();

        assert!(next(&mut decoder, &mut buf).is_header());
        assert_eq!(chunk(next(&mut decoder, &mut buf)), "abc");
        assert!(next(&mut decoder, &mut buf).into_payload_item().unwrap().is_eof());

        let trailers = decoder.take_trailers().unwrap();
        assert_eq!(trailers.get("x-checksum").unwrap(), "9");
    }

    #[test]
    fn close_delimited_body() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nabc"[..]);
        let mut decoder = ResponseDecoder::new();

        assert!(next(&mut decoder, &mut buf).is_header());
        assert_eq!(chunk(next(&mut decoder, &mut buf)), "abc");
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"def");
        assert_eq!(chunk(decoder.decode_eof(&mut buf).unwrap().unwrap()), "def");
        assert!(decoder.decode_eof(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
        assert!(decoder.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn truncated_head_at_eof() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-"[..]);
        let mut decoder = ResponseDecoder::new();

        assert!(matches!(decoder.decode_eof(&mut buf), Err(ParseError::Io { .. })));

        let mut empty = BytesMut::new();
        assert!(ResponseDecoder::new().decode_eof(&mut empty).unwrap().is_none());
    }

    #[test]
    fn finish_buffered_payload() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel"[..]);
        let mut decoder = ResponseDecoder::new();

        assert!(next(&mut decoder, &mut buf).is_header());
        assert!(!decoder.finish_buffered(&mut buf).unwrap());

        buf.extend_from_slice(b"loHTTP/1.1");
        assert!(decoder.finish_buffered(&mut buf).unwrap());
        assert_eq!(&buf[..], b"HTTP/1.1");
        assert!(decoder.finish_buffered(&mut buf).unwrap());
    }
}
