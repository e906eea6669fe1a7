// ---------------------------------------------------------------------------
// handlers/mcp_tools.rs -- MCP-enhanced endpoints returning the tool's text
// ---------------------------------------------------------------------------

use std::fmt::Write as _;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde_json::json;

use crate::models::{AnalysisTypeQuery, McpChatRequest, McpQueryRequest};
use crate::state::AppState;
use crate::users::{self, User};

use super::{invoke_tool, json_body, non_empty, now_rfc3339, require_text, HandlerResult, ToolArgs};

const MCP_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
const SAMPLE_SIZE: usize = 10;

#[utoipa::path(post, path = "/api/v1/mcp/chat", tag = "mcp",
    request_body = McpChatRequest,
    responses(
        (status = 200, description = "Text reply from ai_chat", body = Value),
        (status = 503, description = "MCP session not initialized")
    )
)]
pub async fn mcp_chat(
    State(state): State<AppState>,
    body: Result<Json<McpChatRequest>, JsonRejection>,
) -> HandlerResult {
    let req = json_body(body)?;
    let prompt = require_text(req.prompt, "prompt")?;

    let args = ToolArgs::new()
        .set("prompt", state.ai.enhance_prompt(&prompt))
        .set_opt("provider", non_empty(req.provider))
        .set_opt("model", non_empty(req.model))
        .with_ai_defaults(&state.ai);
    let provider = args.get_str("provider").map(str::to_owned);
    let model = args.get_str("model").map(str::to_owned);

    let outcome = invoke_tool(&state, "ai_chat", args, MCP_TOOL_TIMEOUT).await?;

    Ok(Json(json!({
        "result": outcome.result.first_text(),
        "provider": provider,
        "model": model,
        "method": "mcp_ai_chat",
        "timestamp": now_rfc3339(),
    })))
}

/// Plain-text digest of the user table fed to the analysis tool.
fn user_sample(users: &[User]) -> String {
    let mut out = format!("Total users: {}\n", users.len());
    for user in users.iter().take(SAMPLE_SIZE) {
        let _ = writeln!(
            out,
            "User {}: name={}, email={}, age={}",
            user.id, user.name, user.email, user.age
        );
    }
    out
}

#[utoipa::path(get, path = "/api/v1/mcp/analyze", tag = "mcp",
    params(AnalysisTypeQuery),
    responses((status = 200, description = "Analysis of a user sample", body = Value))
)]
pub async fn mcp_analyze(
    State(state): State<AppState>,
    Query(query): Query<AnalysisTypeQuery>,
) -> HandlerResult {
    let analysis_type =
        non_empty(query.analysis_type).unwrap_or_else(|| "general_analysis".to_string());

    let data = match &state.store {
        Some(store) => match users::load_users(store, &state.user_table).await {
            Ok(all) => user_sample(&all),
            Err(e) => {
                tracing::warn!("mcp_analyze: user sample unavailable: {}", e);
                "No user data available".to_string()
            }
        },
        None => "No user data available".to_string(),
    };

    let args = ToolArgs::new()
        .set("data", data)
        .set("analysis_type", analysis_type.as_str())
        .set(
            "context",
            format!("Analyze this user data with a focus on {analysis_type}"),
        );
    let outcome = invoke_tool(&state, "ai_analyze_data", args, MCP_TOOL_TIMEOUT).await?;

    Ok(Json(json!({
        "result": outcome.result.first_text(),
        "analysis_type": analysis_type,
        "method": "mcp_ai_analysis",
        "timestamp": now_rfc3339(),
    })))
}

#[utoipa::path(post, path = "/api/v1/mcp/query", tag = "mcp",
    request_body = McpQueryRequest,
    responses((status = 200, description = "Query analysis text", body = Value))
)]
pub async fn mcp_query(
    State(state): State<AppState>,
    body: Result<Json<McpQueryRequest>, JsonRejection>,
) -> HandlerResult {
    let req = json_body(body)?;
    let description = require_text(req.description, "description")?;

    let args = ToolArgs::new()
        .set("description", description.as_str())
        .set("analysis_type", "smart_query")
        .set("table_name", state.user_table.as_str());
    let outcome = invoke_tool(&state, "ai_query_with_analysis", args, MCP_TOOL_TIMEOUT).await?;

    Ok(Json(json!({
        "result": outcome.result.first_text(),
        "description": description,
        "method": "mcp_ai_query",
        "timestamp": now_rfc3339(),
    })))
}
