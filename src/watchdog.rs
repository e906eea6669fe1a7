// mcp-bridge -- Background watchdog
//
// Periodically checks dependency health and performs recovery:
// - DB connectivity ping (SELECT 1)
// - MCP liveness ping; reconnect + re-initialize when the session is gone
// - Logs health status for external monitoring

use std::time::Duration;

use crate::mcp::{ConnectionState, Handshake, McpError};
use crate::state::AppState;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);
const DB_PING_TIMEOUT: Duration = Duration::from_secs(5);
const MCP_PING_TIMEOUT: Duration = Duration::from_secs(5);

pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("watchdog: started (interval={}s)", CHECK_INTERVAL.as_secs());

        loop {
            tokio::time::sleep(CHECK_INTERVAL).await;

            let db = check_db(&state).await;
            let mcp = check_mcp(&state).await;

            if db != Health::Failed && mcp == Health::Ok {
                tracing::debug!("watchdog: all checks passed");
            } else {
                tracing::warn!("watchdog: db={} mcp={}", db.label(), mcp.label());
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Ok,
    Skipped,
    Recovered,
    Failed,
}

impl Health {
    fn label(self) -> &'static str {
        match self {
            Health::Ok => "ok",
            Health::Skipped => "n/a",
            Health::Recovered => "RECONNECTED",
            Health::Failed => "FAIL",
        }
    }
}

async fn check_db(state: &AppState) -> Health {
    let Some(store) = &state.store else {
        return Health::Skipped;
    };

    match tokio::time::timeout(DB_PING_TIMEOUT, store.ping()).await {
        Ok(Ok(())) => Health::Ok,
        Ok(Err(e)) => {
            tracing::error!("watchdog: DB ping failed: {}", e);
            Health::Failed
        }
        Err(_) => {
            tracing::error!("watchdog: DB ping timed out after {}s", DB_PING_TIMEOUT.as_secs());
            Health::Failed
        }
    }
}

async fn check_mcp(state: &AppState) -> Health {
    let current = state.mcp.read().await.clone();

    match current {
        Some(client) if client.state() == ConnectionState::Initialized => {
            match client.ping(MCP_PING_TIMEOUT).await {
                Ok(()) => Health::Ok,
                Err(e) if e.is_connection_lost() => {
                    tracing::warn!("watchdog: MCP connection lost: {}", e);
                    reconnect(state).await
                }
                // A slow or protocol-level answer still means the link is up.
                Err(e) => {
                    tracing::warn!("watchdog: MCP ping failed: {}", e);
                    Health::Failed
                }
            }
        }
        Some(client) => {
            tracing::warn!("watchdog: MCP session is {:?}", client.state());
            reconnect(state).await
        }
        None => reconnect(state).await,
    }
}

async fn reconnect(state: &AppState) -> Health {
    tracing::info!("watchdog: reconnecting to MCP at {}", state.mcp_settings.server_url);
    match state.connect_mcp().await {
        Ok(handshake) => {
            tracing::info!("watchdog: MCP session restored ({})", handshake_label(&handshake));
            Health::Recovered
        }
        Err(e) => {
            log_reconnect_failure(&e);
            Health::Failed
        }
    }
}

fn handshake_label(handshake: &Handshake) -> &'static str {
    match handshake {
        Handshake::Completed(_) => "fresh handshake",
        Handshake::AlreadyInitialized => "already initialized",
    }
}

fn log_reconnect_failure(err: &McpError) {
    if err.is_connection_lost() {
        tracing::warn!("watchdog: MCP server unreachable: {}", err);
    } else {
        tracing::error!("watchdog: MCP reconnect failed: {}", err);
    }
}
