//! Caller-controlled header ordering for outgoing requests.
//!
//! Attach a [`HeaderOrder`] to a request (through its extensions or the
//! request options of a connection) and the listed headers are written first,
//! in list order and with the given spelling. Headers the list does not name
//! follow in map order.

use http::{HeaderMap, HeaderName, HeaderValue};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOrder {
    entries: Vec<OrderedHeader>,
}

/// One entry of a [`HeaderOrder`].
///
/// When the request lacks the header and a default value is set, the default
/// is written in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedHeader {
    name: String,
    default: Option<HeaderValue>,
}

impl OrderedHeader {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), default: None }
    }

    pub fn with_default(name: impl Into<String>, value: HeaderValue) -> Self {
        Self { name: name.into(), default: Some(value) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Option<&HeaderValue> {
        self.default.as_ref()
    }
}

impl HeaderOrder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>) -> Self {
        self.entries.push(OrderedHeader::new(name));
        self
    }

    #[must_use]
    pub fn header_with_default(mut self, name: impl Into<String>, value: HeaderValue) -> Self {
        self.entries.push(OrderedHeader::with_default(name, value));
        self
    }

    pub fn entries(&self) -> &[OrderedHeader] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lists the header lines of `headers` in write order.
    ///
    /// Entries whose name is not a valid header name are skipped, and a name
    /// listed twice is written once.
    pub(crate) fn apply<'a>(&'a self, headers: &'a HeaderMap) -> Vec<(&'a str, &'a HeaderValue)> {
        let mut lines = Vec::with_capacity(headers.len() + self.entries.len());
        let mut written: Vec<HeaderName> = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let Ok(name) = HeaderName::from_bytes(entry.name.as_bytes()) else {
                continue;
            };
            if written.contains(&name) {
                continue;
            }

            let mut values = headers.get_all(&name).iter().peekable();
            if values.peek().is_some() {
                lines.extend(values.map(|value| (entry.name.as_str(), value)));
            } else if let Some(default) = &entry.default {
                lines.push((entry.name.as_str(), default));
            }
            written.push(name);
        }

        lines.extend(headers.iter().filter(|(name, _)| !written.contains(name)).map(|(name, value)| (name.as_str(), value)));
        lines
    }
}

impl<S: Into<String>> FromIterator<S> for HeaderOrder {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self { entries: iter.into_iter().map(OrderedHeader::new).collect() }
    }
}

impl From<Vec<OrderedHeader>> for HeaderOrder {
    fn from(entries: Vec<OrderedHeader>) -> Self {
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use http::header;

    use super::*;

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("example.com"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("micro-h1"));
        headers
    }

    #[test]
    fn ordered_headers_come_first() {
        let headers = headers();
        let order: HeaderOrder = ["User-Agent", "Cookie"].into_iter().collect();

        let lines = order.apply(&headers);
        let names: Vec<&str> = lines.iter().map(|(name, _)| *name).collect();

        assert_eq!(names[..3], ["User-Agent", "Cookie", "Cookie"]);
        assert_eq!(lines[1].1, "a=1");
        assert_eq!(lines[2].1, "b=2");
        assert_eq!(lines.len(), 5);
        assert!(names[3..].contains(&"host"));
        assert!(names[3..].contains(&"accept"));
    }

    #[test]
    fn default_value_fills_missing_header() {
        let headers = headers();
        let order = HeaderOrder::new().header_with_default("Accept-Language", HeaderValue::from_static("en")).header("host");

        let lines = order.apply(&headers);

        assert_eq!(lines[0], ("Accept-Language", &HeaderValue::from_static("en")));
        assert_eq!(lines[1], ("host", &HeaderValue::from_static("example.com")));
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn missing_and_invalid_entries_are_skipped() {
        let headers = headers();
        let order = HeaderOrder::new().header("X-Missing").header("bad name").header("accept").header("Accept");

        let lines = order.apply(&headers);

        assert_eq!(lines[0], ("accept", &HeaderValue::from_static("*/*")));
        assert_eq!(lines.len(), 5);
    }
}
