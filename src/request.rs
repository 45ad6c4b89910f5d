use crate::error::ProxyError;

/// How a relayed connection reaches its origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    /// `CONNECT` request: confirm the tunnel, then move opaque bytes.
    Tunnel,
    /// Plain HTTP request: replay the original bytes to the origin.
    Forward,
}

/// A classified proxy request with its extracted target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub kind: RelayKind,
    pub host: String,
    pub port: u16,
    /// Raw `Proxy-Authorization` header value, if the header was present.
    pub auth_header: Option<String>,
}

/// Outcome of inspecting the first segment of a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// `GET /metrics` served in-band, never authenticated, never relayed.
    Metrics,
    Relay(RelayRequest),
}

/// Classify the first data segment received on a client connection.
///
/// Only this single segment is inspected: the request line and the `Host` /
/// `Proxy-Authorization` headers are assumed to arrive within it. There is no
/// reassembly of fragmented requests.
///
/// The upstream port is fixed by the request kind: 443 for tunnels (any port
/// in the `CONNECT` line is ignored), 80 for forwards.
pub fn classify(data: &[u8]) -> Result<Classification, ProxyError> {
    let text = String::from_utf8_lossy(data);

    if text.starts_with("GET /metrics") {
        return Ok(Classification::Metrics);
    }

    let auth_header = proxy_authorization(&text);

    if text.contains("CONNECT") {
        let host = connect_target(&text)?;
        return Ok(Classification::Relay(RelayRequest {
            kind: RelayKind::Tunnel,
            host,
            port: 443,
            auth_header,
        }));
    }

    let host = header_value(&text, "Host: ")
        .ok_or_else(|| ProxyError::Parse("no Host header in forward request".to_string()))?;
    Ok(Classification::Relay(RelayRequest {
        kind: RelayKind::Forward,
        host,
        port: 80,
        auth_header,
    }))
}

/// Extract the tunnel target from a `CONNECT host[:port] ...` line,
/// dropping any `:port` suffix.
fn connect_target(text: &str) -> Result<String, ProxyError> {
    let after = text
        .split("CONNECT ")
        .nth(1)
        .ok_or_else(|| ProxyError::Parse("malformed CONNECT line".to_string()))?;
    let authority = after.split(' ').next().unwrap_or("");
    let host = authority.split(':').next().unwrap_or("");
    if host.is_empty() {
        return Err(ProxyError::Parse("malformed CONNECT line".to_string()));
    }
    Ok(host.to_string())
}

/// Value of the first occurrence of `prefix`, up to the next CRLF or the end
/// of the segment.
fn header_value(text: &str, prefix: &str) -> Option<String> {
    let start = text.find(prefix)? + prefix.len();
    let rest = &text[start..];
    let end = rest.find("\r\n").unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

/// Capture the `Proxy-Authorization` header value. A missing header is a
/// distinct state from an invalid one: only present values are ever checked
/// against credentials.
fn proxy_authorization(text: &str) -> Option<String> {
    let start = text.find("Proxy-Authorization: ")? + "Proxy-Authorization: ".len();
    let rest = &text[start..];
    let end = rest.find("\r\n")?;
    Some(rest[..end].to_string())
}
