//! HTTP header processing module for encoding and decoding message heads
//!
//! # Components
//!
//! - [`ResponseHeaderDecoder`]: Decodes a status line and header block, and
//!   chooses how the response body is framed
//! - [`RequestHeaderDecoder`]: Decodes a request line and header block
//! - [`RequestHeaderEncoder`]: Writes a request line and header block,
//!   resolving the host and the framing headers
//! - [`ResponseHeaderEncoder`]: Writes a status line and header block
//!
//! Both decoders enforce [`HeaderLimits`].

pub(crate) mod framing;
mod header_decoder;
mod header_encoder;
pub(crate) mod lines;

pub use header_decoder::RequestHeaderDecoder;
pub use header_decoder::ResponseHeaderDecoder;
pub use header_encoder::RequestHeaderEncoder;
pub use header_encoder::ResponseHeaderEncoder;

/// Default upper bound on the size of a header block.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

/// Default upper bound on the number of header fields.
pub const DEFAULT_MAX_HEADERS: usize = 100;

/// Limits applied while decoding a header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLimits {
    /// Largest accepted header block, start line and terminating empty line included
    pub max_bytes: usize,
    /// Largest accepted number of header fields
    pub max_headers: usize,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        Self { max_bytes: DEFAULT_MAX_HEADER_BYTES, max_headers: DEFAULT_MAX_HEADERS }
    }
}
