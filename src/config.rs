use color_eyre::eyre::{eyre, Result};
use std::env;
use std::net::SocketAddr;

/// HTTP Basic credentials expected from clients, fixed at process start.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Proxy server configuration derived from environment variables
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub credentials: Credentials,
}

impl ProxyConfig {
    /// Read configuration from `PORT`, `API_USERNAME` and `API_PASSWORD`.
    ///
    /// Any missing or invalid variable aborts startup with a descriptive
    /// message; there is no default and no retry.
    pub fn from_env() -> Result<Self> {
        Self::from_values(
            env::var("PORT").ok(),
            env::var("API_USERNAME").ok(),
            env::var("API_PASSWORD").ok(),
        )
    }

    fn from_values(
        port: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let port = port.ok_or_else(|| eyre!("Missing required environment variable PORT"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| eyre!("Invalid PORT value: {port}"))?;

        let (username, password) = match (username, password) {
            (Some(u), Some(p)) => (u, p),
            _ => {
                return Err(eyre!(
                    "Missing required environment variable API_USERNAME OR API_PASSWORD"
                ))
            }
        };

        Ok(Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            credentials: Credentials { username, password },
        })
    }
}
