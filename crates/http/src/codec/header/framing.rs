//! Message framing headers.
//!
//! Helpers that read `Transfer-Encoding` and `Content-Length` the same way for
//! requests and responses.

use http::{HeaderMap, HeaderValue, header};

use crate::protocol::ParseError;

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// Chunked must be the last encoding if present.
pub(crate) fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value
        && let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next()
    {
        return bytes.trim_ascii().eq_ignore_ascii_case(CHUNKED);
    }
    false
}

/// Reads the declared content length.
///
/// Repeated `Content-Length` headers must agree.
pub(crate) fn content_length(headers: &HeaderMap) -> Result<Option<u64>, ParseError> {
    let mut length = None;
    for value in &headers.get_all(header::CONTENT_LENGTH) {
        let str = value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
        let parsed =
            str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {str} is not u64")))?;

        match length {
            Some(previous) if previous != parsed => {
                return Err(ParseError::invalid_content_length(format!("conflicting values {previous} and {parsed}")));
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_is_chunked() {
        {
            let headers = HeaderMap::new();
            assert!(!is_chunked(headers.get(header::TRANSFER_ENCODING)));
        }

        {
            let mut headers = HeaderMap::new();
            headers.insert("Transfer-Encoding", "gzip, chunked".parse().unwrap());
            assert!(is_chunked(headers.get(header::TRANSFER_ENCODING)));
        }

        {
            let mut headers = HeaderMap::new();
            headers.insert("Transfer-Encoding", "Chunked".parse().unwrap());
            assert!(is_chunked(headers.get(header::TRANSFER_ENCODING)));
        }

        {
            let mut headers = HeaderMap::new();
            headers.insert("Transfer-Encoding", "chunked, gzip".parse().unwrap());
            assert!(!is_chunked(headers.get(header::TRANSFER_ENCODING)));
        }

        {
            let mut headers = HeaderMap::new();
            headers.insert("Transfer-Encoding", "gzip".parse().unwrap());
            assert!(!is_chunked(headers.get(header::TRANSFER_ENCODING)));
        }
    }

    #[test]
    fn content_length_values() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers).unwrap(), None);

        headers.insert(header::CONTENT_LENGTH, " 42 ".parse().unwrap());
        assert_eq!(content_length(&headers).unwrap(), Some(42));

        headers.append(header::CONTENT_LENGTH, "42".parse().unwrap());
        assert_eq!(content_length(&headers).unwrap(), Some(42));

        headers.append(header::CONTENT_LENGTH, "43".parse().unwrap());
        assert!(matches!(content_length(&headers), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn content_length_not_a_number() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, "-1".parse().unwrap());
        assert!(matches!(content_length(&headers), Err(ParseError::InvalidContentLength { .. })));
    }
}
