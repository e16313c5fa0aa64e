use crate::codec::HeaderLimits;

const DEFAULT_READ_BUFFER_CAPACITY: usize = 8 * 1024;
const DEFAULT_WRITE_BUFFER_CAPACITY: usize = 8 * 1024;
const DEFAULT_WAITER_QUEUE_DEPTH: usize = 16;

/// Tuning knobs of a [`ClientConnection`](super::ClientConnection).
///
/// ```
/// use micro_h1::connection::Http1Config;
///
/// let config = Http1Config::new().max_headers(50).read_buffer_capacity(16 * 1024);
/// assert_eq!(config.header_limits().max_headers, 50);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Http1Config {
    read_buffer_capacity: usize,
    write_buffer_capacity: usize,
    header_limits: HeaderLimits,
    waiter_queue_depth: usize,
}

impl Http1Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial capacity of the buffer responses are read into.
    pub fn read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity;
        self
    }

    /// Initial capacity of the buffer requests are encoded into.
    pub fn write_buffer_capacity(mut self, capacity: usize) -> Self {
        self.write_buffer_capacity = capacity;
        self
    }

    /// Largest accepted response header block, in bytes.
    pub fn max_header_bytes(mut self, max_bytes: usize) -> Self {
        self.header_limits.max_bytes = max_bytes;
        self
    }

    /// Largest accepted number of response header fields.
    pub fn max_headers(mut self, max_headers: usize) -> Self {
        self.header_limits.max_headers = max_headers;
        self
    }

    /// How many written requests may wait for their response at once.
    pub fn waiter_queue_depth(mut self, depth: usize) -> Self {
        self.waiter_queue_depth = depth;
        self
    }

    pub fn header_limits(&self) -> HeaderLimits {
        self.header_limits
    }

    pub(crate) fn read_capacity(&self) -> usize {
        self.read_buffer_capacity
    }

    pub(crate) fn write_capacity(&self) -> usize {
        self.write_buffer_capacity
    }

    pub(crate) fn queue_depth(&self) -> usize {
        self.waiter_queue_depth
    }
}

impl Default for Http1Config {
    fn default() -> Self {
        Self {
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
            write_buffer_capacity: DEFAULT_WRITE_BUFFER_CAPACITY,
            header_limits: HeaderLimits::default(),
            waiter_queue_depth: DEFAULT_WAITER_QUEUE_DEPTH,
        }
    }
}
