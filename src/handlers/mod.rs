// ---------------------------------------------------------------------------
// handlers/ -- HTTP adapters
// Sub-modules group routes by surface; mod.rs re-exports all public items
// so that `crate::handlers::*` paths stay flat for lib.rs.
// ---------------------------------------------------------------------------

// Sub-modules are pub(crate) so utoipa __path_* types are accessible from lib.rs OpenApi derive.
pub(crate) mod ai;
pub(crate) mod comparison;
pub(crate) mod mcp_tools;
pub(crate) mod system;
pub(crate) mod traditional;

// ── Re-exports ───────────────────────────────────────────────────────────────

// System / health
pub use system::{health, openapi_json, readiness, service_overview};

// Traditional (database)
pub use traditional::{
    get_user, get_user_direct, list_users, list_users_direct, search_users, user_stats,
};

// MCP-enhanced
pub use mcp_tools::{mcp_analyze, mcp_chat, mcp_query};

// AI tools
pub use ai::{
    ai_chat, ai_generate_sql, ai_insights, ai_query_analysis, ai_smart_query, ai_smart_sql,
    analyze_data,
};

// Comparison
pub use comparison::{capabilities, compare_methods, compare_services, performance};

// ── utoipa __path_* re-exports ───────────────────────────────────────────────
// The #[utoipa::path] attribute macro generates private structs like __path_health.
// The OpenApi derive in lib.rs expects them at `handlers::__path_health`, so we
// re-export them here.
pub use system::{__path_health, __path_readiness, __path_service_overview};
pub use traditional::{
    __path_get_user, __path_get_user_direct, __path_list_users, __path_list_users_direct,
    __path_search_users, __path_user_stats,
};
pub use mcp_tools::{__path_mcp_analyze, __path_mcp_chat, __path_mcp_query};
pub use ai::{
    __path_ai_chat, __path_ai_generate_sql, __path_ai_insights, __path_ai_query_analysis,
    __path_ai_smart_query, __path_ai_smart_sql, __path_analyze_data,
};
pub use comparison::{
    __path_capabilities, __path_compare_methods, __path_compare_services, __path_performance,
};

// ── Shared types ─────────────────────────────────────────────────────────────

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::config::AiConfig;
use crate::db::SqlStore;
use crate::mcp::{McpClient, McpError, ToolCallResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// error
// ---------------------------------------------------------------------------

/// Centralized API error type for all handlers.
/// Logs full details server-side, returns sanitized JSON to the client.
///
/// Response format (structured):
/// ```json
/// {
///   "error": {
///     "code": "BAD_REQUEST",
///     "message": "Human-readable description",
///     "request_id": "uuid",
///     "details": { ... }       // optional, null when absent
///   }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// The remote tool explicitly failed; its message is shown verbatim.
    #[error("Tool failed: {0}")]
    ToolFailed(String),
}

impl ApiError {
    /// Machine-readable error code string for each variant.
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::ToolTimeout(_) => "TOOL_TIMEOUT",
            ApiError::ToolFailed(_) => "TOOL_FAILED",
        }
    }

    /// HTTP status code for each variant.
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ToolTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ToolFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Sanitized message safe to return to clients.
    /// NotFound keeps its (caller-built) message; Upstream and Internal never
    /// leak details.
    fn sanitized_message(&self) -> String {
        match self {
            ApiError::BadRequest(m) => m.clone(),
            ApiError::NotFound(m) => m.clone(),
            ApiError::Upstream(_) => "Upstream service error".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::Unavailable(m) => m.clone(),
            ApiError::ToolTimeout(m) => m.clone(),
            ApiError::ToolFailed(m) => m.clone(),
        }
    }

    /// Attach structured details to the error body.
    pub fn with_details(self, details: Value) -> ApiErrorWithDetails {
        ApiErrorWithDetails {
            error: self,
            details: Some(details),
        }
    }

    fn new_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn respond(&self, details: Option<Value>) -> axum::response::Response {
        use axum::response::IntoResponse;

        let status = self.status_code();
        let request_id = Self::new_request_id();

        // Log full detail server-side (with request_id for correlation)
        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                code = self.error_code(),
                "API error ({}): {}",
                status.as_u16(),
                self
            );
        } else {
            tracing::warn!(
                request_id = %request_id,
                code = self.error_code(),
                "API error ({}): {}",
                status.as_u16(),
                self
            );
        }

        let body = json!({
            "error": {
                "code": self.error_code(),
                "message": self.sanitized_message(),
                "request_id": request_id,
                "details": details,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        self.respond(None)
    }
}

/// ApiError with optional structured details attached.
/// Use `ApiError::ToolTimeout("msg".into()).with_details(json!({...}))` to construct.
pub struct ApiErrorWithDetails {
    pub error: ApiError,
    pub details: Option<Value>,
}

impl From<ApiError> for ApiErrorWithDetails {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            details: None,
        }
    }
}

impl axum::response::IntoResponse for ApiErrorWithDetails {
    fn into_response(self) -> axum::response::Response {
        self.error.respond(self.details)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) type HandlerResult = Result<Json<Value>, ApiErrorWithDetails>;

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn format_duration(d: Duration) -> String {
    format!("{d:?}")
}

/// Unwrap a JSON body, turning axum's rejection into our error shape.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| ApiError::BadRequest(format!("Invalid request format: {}", rejection.body_text())))
}

/// `Some` only for non-blank strings.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn require_text(value: Option<String>, field: &str) -> Result<String, ApiError> {
    non_empty(value).ok_or_else(|| ApiError::BadRequest(format!("'{field}' is required")))
}

pub(crate) fn require_store(state: &AppState) -> Result<&SqlStore, ApiError> {
    state
        .store
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Database service is not available".to_string()))
}

pub(crate) async fn require_mcp(state: &AppState) -> Result<Arc<McpClient>, ApiError> {
    state
        .mcp_client()
        .await
        .ok_or_else(|| ApiError::Unavailable("MCP service is not available".to_string()))
}

/// Argument map under construction for one tool call.
#[derive(Default)]
pub(crate) struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn set_opt(mut self, key: &str, value: Option<impl Into<Value>>) -> Self {
        if let Some(v) = value {
            self.0.insert(key.to_string(), v.into());
        }
        self
    }

    /// Fill `provider` / `model` from config when the caller left them out.
    pub fn with_ai_defaults(mut self, ai: &AiConfig) -> Self {
        if !self.0.contains_key("provider") && !ai.default_provider.is_empty() {
            self.0
                .insert("provider".to_string(), Value::String(ai.default_provider.clone()));
        }
        if !self.0.contains_key("model") && !ai.default_model.is_empty() {
            self.0
                .insert("model".to_string(), Value::String(ai.default_model.clone()));
        }
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// A completed tool call plus how long it took.
pub(crate) struct ToolOutcome {
    pub result: ToolCallResult,
    pub elapsed: Duration,
}

impl ToolOutcome {
    pub fn duration(&self) -> String {
        format_duration(self.elapsed)
    }
}

/// One `call_tool` round trip with HTTP error mapping. A result flagged
/// `isError` is treated like a remote failure.
pub(crate) async fn invoke_tool(
    state: &AppState,
    tool: &str,
    args: ToolArgs,
    preferred_timeout: Duration,
) -> Result<ToolOutcome, ApiErrorWithDetails> {
    let client = require_mcp(state).await?;
    let timeout = state.call_timeout(preferred_timeout);
    let start = Instant::now();

    tracing::info!(tool, "calling MCP tool");
    match client.call_tool(tool, args.into_map(), timeout).await {
        Ok(result) if result.is_error => {
            let elapsed = start.elapsed();
            let message = match result.first_text() {
                "" => format!("tool '{tool}' reported an error"),
                text => text.to_string(),
            };
            Err(ApiError::ToolFailed(message).with_details(tool_details(tool, elapsed)))
        }
        Ok(result) => {
            let elapsed = start.elapsed();
            tracing::info!(tool, "MCP tool completed in {:?}", elapsed);
            Ok(ToolOutcome { result, elapsed })
        }
        Err(e) => Err(tool_error(tool, e, start.elapsed())),
    }
}

fn tool_details(tool: &str, elapsed: Duration) -> Value {
    json!({ "tool": tool, "duration": format_duration(elapsed) })
}

/// Map a client failure to the HTTP surface.
pub(crate) fn tool_error(tool: &str, err: McpError, elapsed: Duration) -> ApiErrorWithDetails {
    let api = match &err {
        McpError::ToolCall { message, .. }
        | McpError::Protocol { message, .. }
        | McpError::Initialization { message, .. } => ApiError::ToolFailed(message.clone()),
        McpError::Timeout { timeout, .. } => ApiError::ToolTimeout(format!(
            "Tool '{tool}' did not respond within {timeout:?}"
        )),
        McpError::Connection { .. } | McpError::Transport(_) | McpError::Closed => {
            ApiError::Unavailable(format!("MCP connection unavailable: {err}"))
        }
        McpError::Decode { .. } => {
            tracing::error!(tool, "MCP result did not match the expected shape: {}", err);
            ApiError::Upstream(err.to_string())
        }
        McpError::Encode { .. } | McpError::DuplicateIdentifier(_) => {
            ApiError::Internal(err.to_string())
        }
    };
    api.with_details(tool_details(tool, elapsed))
}

pub(crate) fn db_error(err: sqlx::Error) -> ApiError {
    ApiError::Internal(format!("database query failed: {err}"))
}
