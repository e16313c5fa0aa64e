use std::io;
use std::sync::Arc;

use http::Version;
use thiserror::Error;

/// Errors surfaced by a client connection and the bodies it hands out.
///
/// A connection that tears down records its cause once; every later operation
/// observes it wrapped in [`HttpError::ConnectionClosed`]. A `cause` of `None`
/// means the connection was closed deliberately and without error.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: ParseError,
    },

    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: SendError,
    },

    #[error("connection closed{}", fmt_cause(.cause))]
    ConnectionClosed { cause: Option<Arc<HttpError>> },

    #[error("connection closed by peer")]
    PeerClosed,

    #[error("request canceled")]
    Canceled,

    #[error("request timed out")]
    Timeout,

    #[error("request write not done")]
    WriteNotDone,

    #[error("response body released before it was fully read")]
    BodyNotConsumed,

    #[error("response did not switch protocols")]
    NotUpgraded,

    #[error("body error: {source}")]
    Body {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn fmt_cause(cause: &Option<Arc<HttpError>>) -> String {
    cause.as_ref().map(|cause| format!(": {cause}")).unwrap_or_default()
}

impl HttpError {
    pub fn closed(cause: Option<Arc<HttpError>>) -> Self {
        Self::ConnectionClosed { cause }
    }

    pub fn body<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> Self {
        Self::Body { source: e.into() }
    }

    /// The recorded teardown cause, if this error reports a closed connection.
    pub fn close_cause(&self) -> Option<&HttpError> {
        match self {
            Self::ConnectionClosed { cause } => cause.as_deref(),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("malformed status line: {line:?}")]
    InvalidStatusLine { line: String },

    #[error("malformed request line: {line:?}")]
    InvalidRequestLine { line: String },

    #[error("invalid status code: {code:?}")]
    InvalidStatusCode { code: String },

    #[error("invalid http version: {version:?}")]
    InvalidVersion { version: String },

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_status_line(line: &[u8]) -> Self {
        Self::InvalidStatusLine { line: String::from_utf8_lossy(line).into_owned() }
    }

    pub fn invalid_request_line(line: &[u8]) -> Self {
        Self::InvalidRequestLine { line: String::from_utf8_lossy(line).into_owned() }
    }

    pub fn invalid_status_code(code: &[u8]) -> Self {
        Self::InvalidStatusCode { code: String::from_utf8_lossy(code).into_owned() }
    }

    pub fn invalid_version(version: &[u8]) -> Self {
        Self::InvalidVersion { version: String::from_utf8_lossy(version).into_owned() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid host: {reason}")]
    InvalidHost { reason: String },

    #[error("unsupported http version: {0:?}")]
    UnsupportedVersion(Version),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_host<S: ToString>(str: S) -> Self {
        Self::InvalidHost { reason: str.to_string() }
    }
}
