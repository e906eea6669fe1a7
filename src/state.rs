// mcp-bridge -- state
//! Shared application state handed to every handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::{AiConfig, BridgeConfig, McpSettings};
use crate::db::SqlStore;
use crate::mcp::{ConnectionState, Handshake, McpClient, McpError};

/// Central application state. Clone-friendly: every field is an `Arc` or
/// cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no `DATABASE_URL` was configured or the connection failed.
    pub store: Option<SqlStore>,
    /// Current MCP session; replaced wholesale on reconnect.
    pub mcp: Arc<RwLock<Option<Arc<McpClient>>>>,
    pub mcp_settings: McpSettings,
    pub ai: Arc<AiConfig>,
    pub user_table: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: &BridgeConfig, store: Option<SqlStore>) -> Self {
        Self {
            store,
            mcp: Arc::new(RwLock::new(None)),
            mcp_settings: config.mcp.clone(),
            ai: Arc::new(config.ai.clone()),
            user_table: config.user_table.clone(),
            start_time: Instant::now(),
        }
    }

    /// The MCP client, but only once its handshake has completed.
    pub async fn mcp_client(&self) -> Option<Arc<McpClient>> {
        self.mcp
            .read()
            .await
            .as_ref()
            .filter(|c| c.is_initialized())
            .cloned()
    }

    /// `"initialized"`, `"connected"`, `"closed"` or `"disconnected"`.
    pub async fn mcp_status(&self) -> &'static str {
        match self.mcp.read().await.as_ref().map(|c| c.state()) {
            Some(ConnectionState::Initialized) => "initialized",
            Some(ConnectionState::Connected) => "connected",
            Some(ConnectionState::Closed) => "closed",
            None => "disconnected",
        }
    }

    /// Swap in a new client, closing the one it replaces.
    pub async fn install_mcp(&self, client: McpClient) {
        let previous = self.mcp.write().await.replace(Arc::new(client));
        if let Some(old) = previous {
            old.close().await;
        }
    }

    /// Connect to the configured MCP server, handshake, and install the
    /// client. One attempt; callers own any retry policy.
    pub async fn connect_mcp(&self) -> Result<Handshake, McpError> {
        let client = McpClient::connect(&self.mcp_settings.server_url).await?;
        match client.initialize(self.mcp_settings.handshake_timeout).await {
            Ok(handshake) => {
                self.install_mcp(client).await;
                Ok(handshake)
            }
            Err(e) => {
                client.close().await;
                Err(e)
            }
        }
    }

    pub async fn shutdown_mcp(&self) {
        let current = self.mcp.write().await.take();
        if let Some(client) = current {
            client.close().await;
        }
    }

    /// Per-route timeout, capped by `MCP_TIMEOUT_SECS`.
    pub fn call_timeout(&self, preferred: Duration) -> Duration {
        preferred.min(self.mcp_settings.call_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::memory_transport;

    fn state() -> AppState {
        let config = BridgeConfig::from_lookup(|_| None).unwrap();
        AppState::new(&config, None)
    }

    #[tokio::test]
    async fn uninitialized_client_is_not_handed_out() {
        let s = state();
        assert_eq!(s.mcp_status().await, "disconnected");
        assert!(s.mcp_client().await.is_none());

        let (sink, stream, _peer) = memory_transport();
        s.install_mcp(McpClient::from_transport("memory://mcp", sink, stream))
            .await;
        assert_eq!(s.mcp_status().await, "connected");
        assert!(s.mcp_client().await.is_none());
    }

    #[tokio::test]
    async fn replacing_a_client_closes_the_old_one() {
        let s = state();
        let (sink, stream, _p1) = memory_transport();
        s.install_mcp(McpClient::from_transport("memory://one", sink, stream))
            .await;
        let first = s.mcp.read().await.clone().unwrap();

        let (sink, stream, _p2) = memory_transport();
        s.install_mcp(McpClient::from_transport("memory://two", sink, stream))
            .await;
        assert_eq!(first.state(), ConnectionState::Closed);

        s.shutdown_mcp().await;
        assert_eq!(s.mcp_status().await, "disconnected");
    }

    #[test]
    fn call_timeout_is_capped_by_config() {
        let s = state();
        assert_eq!(s.call_timeout(Duration::from_secs(90)), Duration::from_secs(30));
        assert_eq!(s.call_timeout(Duration::from_secs(5)), Duration::from_secs(5));
    }
}
