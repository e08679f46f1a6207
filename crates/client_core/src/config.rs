use std::time::Duration;

use url::Url;

use crate::error::TransportError;

/// Transport tuning knobs. The defaults match the gateway's production
/// behavior: 1s..30s exponential backoff, never give up, keep the most
/// recent 500 output lines per operation.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Full socket endpoint, `ws://` or `wss://`.
    pub url: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failed connection attempts tolerated before the manager
    /// parks in [`crate::ConnectionStatus::Unreachable`].
    pub max_reconnect_attempts: u32,
    /// Ring-buffer cap on each operation's retained output lines.
    pub output_cap: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8443/ws".into(),
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(30),
            max_reconnect_attempts: u32::MAX,
            output_cap: 500,
        }
    }
}

impl TransportConfig {
    /// Builds a config from an `http(s)` base URL, deriving the socket scheme
    /// from the server scheme (`https` becomes `wss`) and targeting the
    /// well-known `/ws` path when the URL carries none.
    pub fn for_server(server_url: &str) -> Result<Self, TransportError> {
        let ws_url = if let Some(rest) = server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if server_url.starts_with("ws://") || server_url.starts_with("wss://") {
            server_url.to_string()
        } else {
            return Err(TransportError::InvalidUrl {
                url: server_url.to_string(),
                reason: "expected an http://, https://, ws:// or wss:// URL".into(),
            });
        };

        let mut url = Url::parse(&ws_url).map_err(|err| TransportError::InvalidUrl {
            url: ws_url.clone(),
            reason: err.to_string(),
        })?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path("/ws");
        }

        Ok(Self {
            url: url.to_string(),
            ..Self::default()
        })
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
