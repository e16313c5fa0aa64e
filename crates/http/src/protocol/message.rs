use bytes::{Buf, Bytes};
use http::Method;
use http_body::SizeHint;

/// Represents a HTTP message that can either be a header or payload.
///
/// This enum is used to handle both request and response messages in the HTTP protocol.
/// The generic parameter `T` typically represents the header type (request or response header),
/// while `Data` represents the type of the payload data (defaults to `Bytes`).
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the header information of type `T`
    Header(T),
    /// Contains a chunk of payload data or EOF marker
    Payload(PayloadItem<Data>),
}

/// Represents an item in the HTTP message payload stream.
///
/// This enum is used by the payload decoder to produce either data chunks
/// or signal the end of the payload stream (EOF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

/// Represents the size information of an HTTP payload.
///
/// The same type describes the framing of outgoing request bodies and of
/// incoming response bodies. Only responses may be delimited by the peer
/// closing the connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Payload that runs until the peer closes the connection
    UntilClose,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Returns true if the payload ends when the peer closes the connection
    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }

    /// Chooses the framing of an outgoing request body.
    ///
    /// A body of exactly known size is sent with `Content-Length`, an unknown
    /// size falls back to chunked transfer coding. A known-empty body still
    /// advertises `Content-Length: 0` for methods that conventionally carry a
    /// payload.
    pub fn classify(method: &Method, hint: &SizeHint) -> Self {
        match hint.exact() {
            Some(0) if matches!(*method, Method::POST | Method::PUT | Method::PATCH) => PayloadSize::Length(0),
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        }
    }
}

impl From<PayloadSize> for SizeHint {
    fn from(size: PayloadSize) -> Self {
        match size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Empty => SizeHint::with_exact(0),
            PayloadSize::Chunked | PayloadSize::UntilClose => SizeHint::new(),
        }
    }
}

impl<T> Message<T> {
    /// Returns true if this message contains header information
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Converts the message into a PayloadItem if it contains payload data
    ///
    /// Returns None if the message contains header information
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    ///
    /// Returns None if this is an EOF marker
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    /// Consumes the PayloadItem and returns the contained bytes if this is a Chunk
    ///
    /// Returns None if this is an EOF marker
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_sizes() {
        assert_eq!(PayloadSize::classify(&Method::POST, &SizeHint::with_exact(12)), PayloadSize::Length(12));
        assert_eq!(PayloadSize::classify(&Method::POST, &SizeHint::with_exact(0)), PayloadSize::Length(0));
        assert_eq!(PayloadSize::classify(&Method::GET, &SizeHint::with_exact(0)), PayloadSize::Empty);
    }

    #[test]
    fn classify_unknown_size_is_chunked() {
        assert_eq!(PayloadSize::classify(&Method::PUT, &SizeHint::new()), PayloadSize::Chunked);

        let mut hint = SizeHint::new();
        hint.set_lower(3);
        hint.set_upper(10);
        assert_eq!(PayloadSize::classify(&Method::POST, &hint), PayloadSize::Chunked);
    }

    #[test]
    fn size_hint_from_payload_size() {
        assert_eq!(SizeHint::from(PayloadSize::Length(7)).exact(), Some(7));
        assert_eq!(SizeHint::from(PayloadSize::Empty).exact(), Some(0));
        assert_eq!(SizeHint::from(PayloadSize::Chunked).exact(), None);
        assert_eq!(SizeHint::from(PayloadSize::UntilClose).upper(), None);
    }
}
