//! HTTP response header handling implementation.
//!
//! Responses read off the wire are decoded into a [`ResponseHeader`], which
//! wraps `http::Response<()>` until the connection attaches a body to it.
//! [`ResponseHead`] is the plain form accepted by the response encoder.

use bytes::Bytes;
use http::{Extensions, HeaderMap, Response, StatusCode, Version, header};

/// Type alias for HTTP response headers before a body is attached.
pub type ResponseHead = Response<()>;

/// A decoded HTTP/1 response status line and header block.
#[derive(Debug)]
pub struct ResponseHeader {
    inner: Response<()>,
}

impl ResponseHeader {
    pub fn into_inner(self) -> Response<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Response<T>`.
    pub fn body<T>(self, body: T) -> Response<T> {
        self.inner.map(|_| body)
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn extensions(&self) -> &Extensions {
        self.inner.extensions()
    }

    /// Returns true for `101 Switching Protocols`.
    pub fn is_upgrade(&self) -> bool {
        self.status() == StatusCode::SWITCHING_PROTOCOLS
    }

    /// Returns true if the server announced it will close the connection after
    /// this response.
    ///
    /// HTTP/1.0 responses close unless they opt into keep-alive.
    pub fn wants_close(&self) -> bool {
        if has_connection_token(self.headers(), "close") {
            return true;
        }
        self.version() == Version::HTTP_10 && !has_connection_token(self.headers(), "keep-alive")
    }
}

impl From<Response<()>> for ResponseHeader {
    #[inline]
    fn from(inner: Response<()>) -> Self {
        Self { inner }
    }
}

impl AsRef<Response<()>> for ResponseHeader {
    fn as_ref(&self) -> &Response<()> {
        &self.inner
    }
}

/// Returns true if any `Connection` header lists `token`.
fn has_connection_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

/// A reason phrase in an HTTP/1 response.
///
/// It is present in the extensions of a delivered response only when the
/// server sent a phrase different from the canonical one for the status code.
/// `HTTP/1.1 200 Awesome` carries `Awesome`, `HTTP/1.1 200 OK` carries nothing.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReasonPhrase(Bytes);

impl ReasonPhrase {
    /// Wraps raw reason bytes taken from a parsed status line.
    #[inline]
    pub(crate) fn from_bytes_unchecked(reason: Bytes) -> Self {
        Self(reason)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ReasonPhrase {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
