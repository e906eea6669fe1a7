// mcp/error -- typed failures of the protocol client

use std::time::Duration;

use serde_json::Value;

/// Every failure the protocol client can report.
///
/// Callers react differently per variant: remote protocol errors go back to
/// the end user verbatim, timeouts and transport failures mean the service is
/// unavailable, decode failures mean client and server disagree on a schema.
#[derive(Debug, Clone, thiserror::Error)]
pub enum McpError {
    #[error("failed to connect to MCP server at {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("MCP transport failure: {0}")]
    Transport(String),

    #[error("no response to '{method}' (id {id}) within {timeout:?}")]
    Timeout {
        method: String,
        id: String,
        timeout: Duration,
    },

    #[error("initialize rejected by MCP server: {code} - {message}")]
    Initialization { code: i64, message: String },

    #[error("tool call failed: {code} - {message}")]
    ToolCall {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("MCP server returned an error for '{method}': {code} - {message}")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },

    #[error("malformed '{method}' result: {reason}")]
    Decode { method: String, reason: String },

    #[error("failed to encode '{method}' request: {reason}")]
    Encode { method: String, reason: String },

    #[error("identifier {0} is already awaiting a response")]
    DuplicateIdentifier(String),

    #[error("MCP client is closed")]
    Closed,
}

impl McpError {
    /// JSON-RPC error code when the remote explicitly rejected the request.
    pub fn protocol_code(&self) -> Option<i64> {
        match self {
            McpError::Initialization { code, .. }
            | McpError::ToolCall { code, .. }
            | McpError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// `true` when the connection can no longer carry requests.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            McpError::Connection { .. } | McpError::Transport(_) | McpError::Closed
        )
    }
}
