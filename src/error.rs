use thiserror::Error;

/// Per-connection failure cases.
///
/// Configuration problems are reported at startup through `color_eyre` and
/// never reach a connection flow. A failed credential check is a response
/// path (401), not an error value.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The first segment could not be classified (missing Host header,
    /// malformed CONNECT line).
    #[error("failed to parse request: {0}")]
    Parse(String),

    /// Upstream connect or handshake write failed.
    #[error(transparent)]
    Network(#[from] std::io::Error),
}
