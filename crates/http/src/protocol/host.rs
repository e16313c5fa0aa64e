//! Host normalization for outgoing requests.
//!
//! Internationalized host names are converted to their ASCII (punycode) form
//! and IPv6 zone identifiers are stripped before a host is written into the
//! `Host` header or a `CONNECT` request target.

use crate::protocol::SendError;

/// Converts the host part of `host_port` to ASCII, keeping any port.
///
/// Pure ASCII input is returned unchanged.
pub fn punycode_host_port(host_port: &str) -> Result<String, SendError> {
    if host_port.is_ascii() {
        return Ok(host_port.to_owned());
    }

    let (host, port) = split_host_port(host_port);
    let ascii = match url::Host::parse(host).map_err(|e| SendError::invalid_host(format!("{host_port}: {e}")))? {
        url::Host::Domain(domain) => domain,
        other => other.to_string(),
    };

    Ok(match port {
        Some(port) => format!("{ascii}:{port}"),
        None => ascii,
    })
}

/// Removes an IPv6 zone identifier such as `%eth0` from a bracketed host.
pub fn remove_zone(host: &str) -> String {
    if !host.starts_with('[') {
        return host.to_owned();
    }
    let Some(close) = host.rfind(']') else {
        return host.to_owned();
    };
    let Some(zone) = host[..close].rfind('%') else {
        return host.to_owned();
    };
    format!("{}{}", &host[..zone], &host[close..])
}

/// Normalizes a request host for the wire.
pub fn normalize_host(host: &str) -> Result<String, SendError> {
    punycode_host_port(host).map(|host| remove_zone(&host))
}

fn split_host_port(host_port: &str) -> (&str, Option<&str>) {
    if host_port.starts_with('[') {
        return match host_port.rfind("]:") {
            Some(close) => (&host_port[..=close], Some(&host_port[close + 2..])),
            None => (host_port, None),
        };
    }
    match host_port.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => (host, Some(port)),
        _ => (host_port, None),
    }
}
