mod auth;
mod config;
mod error;
mod handler;
mod relay;
mod request;
mod stats;
mod store;

use crate::config::ProxyConfig;
use crate::handler::{handle_connection, ProxyContext};
use crate::stats::process_stats;
use crate::store::{InMemoryStore, LogStore};

use color_eyre::eyre::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("proxymeter=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    color_eyre::install()?;

    let config = ProxyConfig::from_env()?;

    // One store per process, injected into every connection task
    let store: Arc<dyn LogStore> = Arc::new(InMemoryStore::new());
    let ctx = Arc::new(ProxyContext {
        credentials: config.credentials.clone(),
        store: Arc::clone(&store),
    });

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("proxy listening on http://{}", config.listen_addr);

    // Main accept loop: one task per client connection
    let server = async {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("accepted connection from {}", peer_addr);
                    let ctx = Arc::clone(&ctx);
                    tokio::task::spawn(async move {
                        handle_connection(stream, ctx).await;
                    });
                }
                Err(e) => {
                    warn!("accept error: {} (continuing)", e);
                    continue;
                }
            }
        }
    };

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = server => {
            warn!("Server loop terminated");
        }
        _ = shutdown => {}
    }

    // Final usage snapshot before exit
    let snapshot = process_stats(&store.get_logs());
    match serde_json::to_string(&snapshot) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("failed to serialize final stats: {}", e),
    }

    info!("Server shutdown complete");
    Ok(())
}
