use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;
use url::Url;

use crate::request::RelayKind;

/// Tunnel confirmation written to the client exactly once, before any
/// relayed byte. The trailing bare `\n` is part of the wire contract.
pub const TUNNEL_ESTABLISHED: &[u8] = b"HTTP/1.1 200 OK\r\n\n";

const RELAY_BUF_SIZE: usize = 8192;

/// Result of a completed relay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Total bytes observed flowing upstream→client.
    pub bytes_to_client: u64,
    /// True only when the upstream side ended its stream cleanly. A usage
    /// record is appended exactly when this is set; errors and abrupt
    /// disconnects leave it false.
    pub upstream_eof: bool,
}

/// Perform the protocol handshake and then relay bytes in both directions.
///
/// Tunnel: the client gets the confirmation line and the `CONNECT` payload is
/// never forwarded. Forward: the entire first-read buffer is replayed to the
/// upstream verbatim, so the origin sees the original request line and
/// headers.
///
/// A handshake write failure is returned as an error (the handler turns it
/// into a 500); errors during the relay itself are logged and terminate the
/// loop without an error value.
pub async fn run<C, U>(
    client: &mut C,
    upstream: &mut U,
    kind: RelayKind,
    initial: &[u8],
) -> io::Result<RelayOutcome>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    match kind {
        RelayKind::Tunnel => client.write_all(TUNNEL_ESTABLISHED).await?,
        RelayKind::Forward => upstream.write_all(initial).await?,
    }

    Ok(relay(client, upstream).await)
}

/// Bidirectional copy loop. Client→upstream bytes are piped uncounted;
/// upstream→client chunks are counted, then forwarded unmodified.
///
/// No idle timer and no maximum duration: a stalled peer holds the
/// connection open indefinitely, matching the documented resource model.
pub async fn relay<C, U>(client: &mut C, upstream: &mut U) -> RelayOutcome
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let mut client_buf = vec![0u8; RELAY_BUF_SIZE];
    let mut upstream_buf = vec![0u8; RELAY_BUF_SIZE];
    let mut outcome = RelayOutcome::default();
    let mut client_open = true;

    loop {
        tokio::select! {
            res = client.read(&mut client_buf), if client_open => {
                match res {
                    Ok(0) => {
                        // Client finished sending. Half-close the upstream
                        // write side and keep draining upstream→client until
                        // the stream ends.
                        client_open = false;
                        if let Err(e) = upstream.shutdown().await {
                            warn!("upstream shutdown error: {}", e);
                            break;
                        }
                    }
                    Ok(n) => {
                        if let Err(e) = upstream.write_all(&client_buf[..n]).await {
                            warn!("upstream write error: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("client read error: {}", e);
                        break;
                    }
                }
            }
            res = upstream.read(&mut upstream_buf) => {
                match res {
                    Ok(0) => {
                        outcome.upstream_eof = true;
                        break;
                    }
                    Ok(n) => {
                        outcome.bytes_to_client += n as u64;
                        if let Err(e) = client.write_all(&upstream_buf[..n]).await {
                            warn!("client write error: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("upstream read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = client.shutdown().await {
        warn!("client shutdown error: {}", e);
    }

    outcome
}

/// Derive the display domain stored in usage records from a target host.
///
/// A host without a scheme is treated as `http://<host>` so the hostname
/// component can be extracted; a leading `www.` is stripped.
pub fn derive_domain(host: &str) -> String {
    let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };

    let hostname = match Url::parse(&with_scheme) {
        Ok(url) => url
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| host.to_string()),
        Err(_) => host.to_string(),
    };

    match hostname.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => hostname,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_derive_domain_strips_www() {
        assert_eq!(derive_domain("www.example.com"), "example.com");
    }

    #[test]
    fn test_derive_domain_plain_host_unchanged() {
        assert_eq!(derive_domain("example.com"), "example.com");
    }

    #[test]
    fn test_derive_domain_keeps_non_www_subdomains() {
        assert_eq!(derive_domain("api.example.com"), "api.example.com");
    }

    #[test]
    fn test_derive_domain_with_scheme() {
        assert_eq!(derive_domain("https://www.example.com"), "example.com");
        assert_eq!(derive_domain("http://example.com"), "example.com");
    }

    #[test]
    fn test_derive_domain_ip_host() {
        assert_eq!(derive_domain("127.0.0.1"), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_relay_counts_upstream_bytes_only() {
        let (mut client, mut client_side) = duplex(1024);
        let (mut origin, mut upstream_side) = duplex(1024);

        let relay_task =
            tokio::spawn(async move { relay(&mut client_side, &mut upstream_side).await });

        // Client sends a request; origin answers with 10 bytes and closes.
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        origin.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        origin.write_all(b"0123456789").await.unwrap();
        origin.shutdown().await.unwrap();
        drop(origin);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"0123456789");

        let outcome = relay_task.await.unwrap();
        assert!(outcome.upstream_eof);
        // Only upstream→client traffic is counted
        assert_eq!(outcome.bytes_to_client, 10);
    }

    #[tokio::test]
    async fn test_relay_zero_bytes_on_immediate_upstream_close() {
        let (mut client, mut client_side) = duplex(1024);
        let (origin, mut upstream_side) = duplex(1024);

        let relay_task =
            tokio::spawn(async move { relay(&mut client_side, &mut upstream_side).await });

        drop(origin);

        let outcome = relay_task.await.unwrap();
        assert!(outcome.upstream_eof);
        assert_eq!(outcome.bytes_to_client, 0);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_tunnel_confirmation_precedes_relayed_bytes() {
        let (mut client, mut client_side) = duplex(1024);
        let (mut origin, mut upstream_side) = duplex(1024);

        let initial = b"CONNECT secure.com:443 HTTP/1.1\r\n\r\n";
        let run_task = tokio::spawn(async move {
            run(&mut client_side, &mut upstream_side, RelayKind::Tunnel, initial).await
        });

        // Origin sends payload and closes
        origin.write_all(b"tls-bytes").await.unwrap();
        origin.shutdown().await.unwrap();

        // The CONNECT line must never reach the origin
        let mut from_proxy = Vec::new();
        origin.read_to_end(&mut from_proxy).await.unwrap();
        assert!(from_proxy.is_empty());
        drop(origin);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.starts_with(TUNNEL_ESTABLISHED));
        assert_eq!(&received[TUNNEL_ESTABLISHED.len()..], b"tls-bytes");

        let outcome = run_task.await.unwrap().unwrap();
        assert!(outcome.upstream_eof);
        assert_eq!(outcome.bytes_to_client, 9);
    }

    #[tokio::test]
    async fn test_forward_replays_initial_buffer() {
        let (mut client, mut client_side) = duplex(1024);
        let (mut origin, mut upstream_side) = duplex(1024);

        let initial = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let run_task = tokio::spawn(async move {
            run(
                &mut client_side,
                &mut upstream_side,
                RelayKind::Forward,
                initial,
            )
            .await
        });

        // Origin sees the original request bytes verbatim
        let mut buf = vec![0u8; initial.len()];
        origin.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, initial);

        origin.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();
        origin.shutdown().await.unwrap();
        drop(origin);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"HTTP/1.1 200 OK\r\n\r\n");

        let outcome = run_task.await.unwrap().unwrap();
        assert!(outcome.upstream_eof);
        assert_eq!(outcome.bytes_to_client, 19);
    }

    #[tokio::test]
    async fn test_client_half_close_drains_upstream() {
        let (mut client, mut client_side) = duplex(1024);
        let (mut origin, mut upstream_side) = duplex(1024);

        let relay_task =
            tokio::spawn(async move { relay(&mut client_side, &mut upstream_side).await });

        // Client stops sending before the origin has answered
        client.shutdown().await.unwrap();

        // Origin observes EOF on its read side, then responds and closes
        let mut from_proxy = Vec::new();
        origin.read_to_end(&mut from_proxy).await.unwrap();
        assert!(from_proxy.is_empty());

        origin.write_all(b"late-response").await.unwrap();
        origin.shutdown().await.unwrap();
        drop(origin);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"late-response");

        let outcome = relay_task.await.unwrap();
        assert!(outcome.upstream_eof);
        assert_eq!(outcome.bytes_to_client, 13);
    }
}
