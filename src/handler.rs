use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::auth;
use crate::config::Credentials;
use crate::error::ProxyError;
use crate::relay::{self, RelayOutcome};
use crate::request::{classify, Classification, RelayRequest};
use crate::stats::process_stats;
use crate::store::{LogStore, UsageRecord};

/// Shared per-process state handed to every connection task.
pub struct ProxyContext {
    pub credentials: Credentials,
    pub store: Arc<dyn LogStore>,
}

const FIRST_READ_BUF_SIZE: usize = 8192;

const UNAUTHORIZED_RESPONSE: &[u8] =
    b"HTTP/1.1 401 Authentication Required\r\nContent-Type: text/html\r\n\r\nAuthentication Required";

const INTERNAL_ERROR_RESPONSE: &[u8] = b"HTTP/1.1 500 Internal Server Error\r\n";

/// Handle one accepted client connection end to end.
///
/// Sequencing only: classify the first segment, serve `/metrics` from the
/// aggregator, gate relayed requests behind the credential check, then hand
/// off to the relay. Every failure is local to this connection.
pub async fn handle_connection<S>(mut client: S, ctx: Arc<ProxyContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; FIRST_READ_BUF_SIZE];
    let n = match client.read(&mut buf).await {
        Ok(0) => return,
        Ok(n) => n,
        Err(e) => {
            warn!("client read error: {}", e);
            return;
        }
    };
    let data = &buf[..n];

    let classification = match classify(data) {
        Ok(c) => c,
        Err(e) => {
            warn!("unparseable request: {}", e);
            respond_internal_error(&mut client).await;
            return;
        }
    };

    match classification {
        Classification::Metrics => serve_metrics(&mut client, ctx.store.as_ref()).await,
        Classification::Relay(request) => {
            if !auth::authorize(&ctx.credentials, request.auth_header.as_deref()) {
                debug!("rejecting request to {} with invalid credentials", request.host);
                respond_unauthorized(&mut client).await;
                return;
            }
            if let Err(e) = proxy_request(&mut client, &request, data, ctx.as_ref()).await {
                warn!("relay to {}:{} failed: {}", request.host, request.port, e);
                respond_internal_error(&mut client).await;
            }
        }
    }
}

/// Open the upstream connection, run the relay and append the usage record
/// when the upstream stream ended cleanly.
async fn proxy_request<S>(
    client: &mut S,
    request: &RelayRequest,
    initial: &[u8],
    ctx: &ProxyContext,
) -> Result<(), ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut upstream = TcpStream::connect((request.host.as_str(), request.port)).await?;
    info!("connected to upstream {}:{}", request.host, request.port);

    let outcome = relay::run(client, &mut upstream, request.kind, initial).await?;
    record_usage(ctx.store.as_ref(), &request.host, &outcome);
    Ok(())
}

/// Append a usage record for a finished relay, exactly once and only when
/// the upstream→client stream ended normally.
fn record_usage(store: &dyn LogStore, host: &str, outcome: &RelayOutcome) {
    if !outcome.upstream_eof {
        return;
    }
    store.save(UsageRecord {
        domain_name: relay::derive_domain(host),
        bytes_processed: outcome.bytes_to_client,
    });
}

/// Serve the aggregated stats as JSON. No credential check applies here and
/// no usage record is ever produced for a metrics request.
async fn serve_metrics<S>(client: &mut S, store: &dyn LogStore)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let stats = process_stats(&store.get_logs());
    let body = match serde_json::to_string(&stats) {
        Ok(body) => body,
        Err(e) => {
            warn!("failed to serialize stats: {}", e);
            return;
        }
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{}",
        body
    );
    if let Err(e) = client.write_all(response.as_bytes()).await {
        warn!("metrics write error: {}", e);
    }
    let _ = client.shutdown().await;
}

async fn respond_unauthorized<S>(client: &mut S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = client.write_all(UNAUTHORIZED_RESPONSE).await {
        warn!("401 write error: {}", e);
    }
    let _ = client.shutdown().await;
}

async fn respond_internal_error<S>(client: &mut S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = client.write_all(INTERNAL_ERROR_RESPONSE).await {
        warn!("500 write error: {}", e);
    }
    let _ = client.shutdown().await;
}
