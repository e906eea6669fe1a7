// ---------------------------------------------------------------------------
// handlers/ai.rs -- AI tool endpoints
// Each handler wraps exactly one `call_tool`, then reshapes the structured
// payload or falls back to the tool's raw text.
// ---------------------------------------------------------------------------

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::mcp::ToolPayload;
use crate::models::{
    AiChatRequest, AnalyzeDataRequest, GenerateSqlRequest, InsightsRequest, QueryAnalysisRequest,
    SmartQueryRequest, SmartSqlRequest,
};
use crate::state::AppState;

use super::{
    invoke_tool, json_body, non_empty, now_rfc3339, require_text, ApiError, HandlerResult,
    ToolArgs, ToolOutcome,
};

const CHAT_TIMEOUT: Duration = Duration::from_secs(30);
const SQL_TIMEOUT: Duration = Duration::from_secs(30);
const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(60);
const INSIGHTS_TIMEOUT: Duration = Duration::from_secs(90);

const DEFAULT_QUERY_LIMIT: u32 = 100;

// ---------------------------------------------------------------------------
// Reshaping helpers
// ---------------------------------------------------------------------------

/// Fallback body when the tool text is not the expected JSON shape.
fn raw_reply(tool: &str, text: String, outcome: &ToolOutcome) -> Value {
    json!({
        "tool": tool,
        "status": "success",
        "result": text,
        "duration": outcome.duration(),
    })
}

/// Decode the tool text as `T` and reshape it, or fall back to [`raw_reply`].
fn reshape<T, F>(tool: &str, outcome: &ToolOutcome, shape: F) -> Value
where
    T: serde::de::DeserializeOwned,
    F: FnOnce(T) -> Value,
{
    match outcome.result.decode::<T>() {
        ToolPayload::Structured(reply) => shape(reply),
        ToolPayload::Raw(text) => raw_reply(tool, text, outcome),
    }
}

fn put_text(body: &mut Value, key: &str, value: &str) {
    if let (Value::Object(map), false) = (body, value.is_empty()) {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn put_value(body: &mut Value, key: &str, value: Option<Value>) {
    if let (Value::Object(map), Some(v)) = (body, value) {
        map.insert(key.to_string(), v);
    }
}

fn success_or(status: String) -> String {
    if status.is_empty() {
        "success".to_string()
    } else {
        status
    }
}

// ---------------------------------------------------------------------------
// Structured reply shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatReply {
    status: String,
    response: String,
    provider: String,
    model: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SqlResultSet {
    columns: Option<Vec<String>>,
    rows: Vec<Value>,
    limited: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SmartSqlReply {
    status: String,
    sql: String,
    prompt: String,
    alias: String,
    limit: u32,
    row_count: Value,
    ai_mode: bool,
    provider: String,
    model: String,
    result: SqlResultSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalysisReply {
    status: String,
    analysis_type: String,
    provider: String,
    model: String,
    analysis: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueryAnalysisReply {
    status: String,
    description: String,
    analysis_type: String,
    query_result: Option<Value>,
    analysis: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InsightsReply {
    status: String,
    prompt: String,
    insight_level: String,
    provider: String,
    model: String,
    insights: String,
    analysis: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SmartQueryReply {
    status: String,
    input_type: String,
    prompt: String,
    sql: String,
    analysis_mode: String,
    limit: Option<Value>,
    row_count: Option<Value>,
    table_name: String,
    alias: String,
    result: Option<Value>,
    raw_result: Option<Value>,
    columns: Option<Value>,
    rows: Option<Value>,
    limited: Option<Value>,
    ai_analysis: String,
    error: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeneratedSqlReply {
    generated_sql: String,
    provider: String,
    model: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[utoipa::path(post, path = "/api/v1/ai/chat", tag = "ai",
    request_body = AiChatRequest,
    responses(
        (status = 200, description = "Chat reply", body = Value),
        (status = 503, description = "MCP session not initialized"),
        (status = 504, description = "Tool did not answer in time")
    )
)]
pub async fn ai_chat(
    State(state): State<AppState>,
    body: Result<Json<AiChatRequest>, JsonRejection>,
) -> HandlerResult {
    let req = json_body(body)?;
    let prompt = require_text(req.prompt, "prompt")?;

    let args = ToolArgs::new()
        .set("prompt", state.ai.enhance_prompt(&prompt))
        .set_opt("provider", non_empty(req.provider))
        .set_opt("model", non_empty(req.model))
        .set_opt("max_tokens", req.max_tokens.filter(|n| *n > 0))
        .set_opt("temperature", req.temperature.filter(|t| *t > 0.0))
        .with_ai_defaults(&state.ai);
    let outcome = invoke_tool(&state, "ai_chat", args, CHAT_TIMEOUT).await?;

    Ok(Json(reshape("ai_chat", &outcome, |r: ChatReply| {
        let mut body = json!({
            "tool": "ai_chat",
            "status": success_or(r.status),
            "response": r.response,
            "duration": outcome.duration(),
        });
        put_text(&mut body, "provider", &r.provider);
        put_text(&mut body, "model", &r.model);
        body
    })))
}

/// Natural language and literal SQL both travel as `prompt`; the remote
/// side detects which one it got.
#[utoipa::path(post, path = "/api/v1/ai/smart-sql", tag = "ai",
    request_body = SmartSqlRequest,
    responses(
        (status = 200, description = "Generated SQL and its rows", body = Value),
        (status = 400, description = "Neither prompt nor sql given")
    )
)]
pub async fn ai_smart_sql(
    State(state): State<AppState>,
    body: Result<Json<SmartSqlRequest>, JsonRejection>,
) -> HandlerResult {
    let req = json_body(body)?;
    let prompt = non_empty(req.prompt)
        .or_else(|| non_empty(req.sql))
        .ok_or_else(|| {
            ApiError::BadRequest("Either 'prompt' (natural language) or 'sql' is required".into())
        })?;

    let args = ToolArgs::new()
        .set("prompt", prompt)
        .set("analysis_mode", "fast")
        .set_opt("alias", non_empty(req.alias))
        .set_opt("limit", req.limit.filter(|n| *n > 0));
    let outcome = invoke_tool(&state, "ai_smart_query", args, SQL_TIMEOUT).await?;

    Ok(Json(reshape("ai_smart_sql", &outcome, |r: SmartSqlReply| {
        let mut body = json!({
            "tool": "ai_smart_sql",
            "status": success_or(r.status),
            "sql": r.sql,
            "ai_mode": r.ai_mode,
            "row_count": r.row_count,
            "duration": outcome.duration(),
        });
        put_text(&mut body, "prompt", &r.prompt);
        put_text(&mut body, "alias", &r.alias);
        if r.limit > 0 {
            put_value(&mut body, "limit", Some(json!(r.limit)));
        }
        if !r.provider.is_empty() {
            put_value(&mut body, "provider", Some(json!(r.provider)));
            put_value(&mut body, "model", Some(json!(r.model)));
        }
        if let Some(columns) = r.result.columns {
            put_value(&mut body, "columns", Some(json!(columns)));
            put_value(&mut body, "rows", Some(Value::Array(r.result.rows)));
            put_value(&mut body, "limited", Some(json!(r.result.limited)));
        }
        body
    })))
}

#[utoipa::path(post, path = "/api/v1/ai/analyze", tag = "ai",
    request_body = AnalyzeDataRequest,
    responses(
        (status = 200, description = "Analysis of the supplied data", body = Value),
        (status = 400, description = "Missing data")
    )
)]
pub async fn analyze_data(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeDataRequest>, JsonRejection>,
) -> HandlerResult {
    let req = json_body(body)?;
    let data = match req.data {
        None | Some(Value::Null) => {
            return Err(ApiError::BadRequest("'data' is required".to_string()).into());
        }
        Some(data) => serde_json::to_string(&data)
            .map_err(|e| ApiError::BadRequest(format!("Invalid data format: {e}")))?,
    };

    let focus = (!req.focus.is_empty()).then_some(req.focus);
    let args = ToolArgs::new()
        .set("data", data)
        .set_opt("analysis_type", non_empty(req.analysis_type))
        .set_opt("context", non_empty(req.context))
        .set_opt("provider", non_empty(req.provider))
        .set_opt("model", non_empty(req.model))
        .set_opt("focus", focus);
    let outcome = invoke_tool(&state, "ai_analyze_data", args, ANALYSIS_TIMEOUT).await?;

    Ok(Json(reshape("ai_analyze_data", &outcome, |r: AnalysisReply| {
        let mut body = json!({
            "tool": "ai_analyze_data",
            "status": success_or(r.status),
            "analysis_type": r.analysis_type,
            "analysis": r.analysis,
            "duration": outcome.duration(),
        });
        put_text(&mut body, "provider", &r.provider);
        put_text(&mut body, "model", &r.model);
        body
    })))
}

#[utoipa::path(post, path = "/api/v1/ai/query-analysis", tag = "ai",
    request_body = QueryAnalysisRequest,
    responses((status = 200, description = "Query result with analysis text", body = Value))
)]
pub async fn ai_query_analysis(
    State(state): State<AppState>,
    body: Result<Json<QueryAnalysisRequest>, JsonRejection>,
) -> HandlerResult {
    let req = json_body(body)?;
    let description = require_text(req.description, "description")?;

    let args = ToolArgs::new()
        .set("description", description)
        .set_opt("analysis_type", non_empty(req.analysis_type))
        .set_opt("table_name", non_empty(req.table_name))
        .set_opt("provider", non_empty(req.provider))
        .set_opt("model", non_empty(req.model));
    let outcome = invoke_tool(&state, "ai_query_with_analysis", args, ANALYSIS_TIMEOUT).await?;

    Ok(Json(reshape(
        "ai_query_with_analysis",
        &outcome,
        |r: QueryAnalysisReply| {
            let mut body = json!({
                "tool": "ai_query_with_analysis",
                "status": success_or(r.status),
                "description": r.description,
                "analysis_type": r.analysis_type,
                "duration": outcome.duration(),
            });
            put_value(&mut body, "query_result", r.query_result);
            // Only the analysis text is surfaced; provider/model move to the top level.
            if let Some(analysis) = r.analysis {
                for key in ["provider", "model", "analysis"] {
                    if let Some(Value::String(s)) = analysis.get(key) {
                        put_text(&mut body, key, s);
                    }
                }
            }
            body
        },
    )))
}

#[utoipa::path(post, path = "/api/v1/ai/insights", tag = "ai",
    request_body = InsightsRequest,
    responses((status = 200, description = "Generated insights", body = Value))
)]
pub async fn ai_insights(
    State(state): State<AppState>,
    body: Result<Json<InsightsRequest>, JsonRejection>,
) -> HandlerResult {
    let req = json_body(body)?;
    let prompt = require_text(req.prompt, "prompt")?;

    let args = ToolArgs::new()
        .set("prompt", state.ai.enhance_prompt(&prompt))
        .set_opt("context", non_empty(req.context))
        .set_opt("insight_level", non_empty(req.insight_level))
        .set_opt("table_name", non_empty(req.table_name))
        .set_opt("provider", non_empty(req.provider))
        .set_opt("model", non_empty(req.model))
        .with_ai_defaults(&state.ai);
    let outcome = invoke_tool(&state, "ai_smart_insights", args, INSIGHTS_TIMEOUT).await?;

    Ok(Json(reshape("ai_smart_insights", &outcome, |r: InsightsReply| {
        let mut body = json!({
            "tool": "ai_smart_insights",
            "status": success_or(r.status),
            "prompt": r.prompt,
            "insight_level": r.insight_level,
            "duration": outcome.duration(),
        });
        let insights = if r.insights.is_empty() { r.analysis } else { r.insights };
        put_text(&mut body, "insights", &insights);
        put_text(&mut body, "provider", &r.provider);
        put_text(&mut body, "model", &r.model);
        body
    })))
}

/// No language instruction here: it would confuse the remote SQL detection.
#[utoipa::path(post, path = "/api/v1/ai/smart-query", tag = "ai",
    request_body = SmartQueryRequest,
    responses(
        (status = 200, description = "SQL, rows and optional analysis", body = Value),
        (status = 400, description = "Neither prompt nor description given")
    )
)]
pub async fn ai_smart_query(
    State(state): State<AppState>,
    body: Result<Json<SmartQueryRequest>, JsonRejection>,
) -> HandlerResult {
    let req = json_body(body)?;
    let prompt = non_empty(req.prompt)
        .or_else(|| non_empty(req.description))
        .ok_or_else(|| {
            ApiError::BadRequest("Either 'prompt' or 'description' is required".to_string())
        })?;

    let default_mode = if req.include_analysis { "full" } else { "fast" };
    let analysis_mode = non_empty(req.analysis_mode).unwrap_or_else(|| default_mode.to_string());
    let table_name = non_empty(req.table_name).unwrap_or_else(|| state.user_table.clone());
    let limit = req.limit.filter(|n| *n > 0).unwrap_or(DEFAULT_QUERY_LIMIT);

    let args = ToolArgs::new()
        .set("prompt", prompt)
        .set("analysis_mode", analysis_mode)
        .set("table_name", table_name)
        .set("limit", limit)
        .set_opt("alias", non_empty(req.alias))
        .set_opt("provider", non_empty(req.provider))
        .set_opt("model", non_empty(req.model))
        .with_ai_defaults(&state.ai);
    let outcome = invoke_tool(&state, "ai_smart_query", args, ANALYSIS_TIMEOUT).await?;

    Ok(Json(reshape("ai_smart_query", &outcome, |r: SmartQueryReply| {
        let failed = !r.error.is_empty();
        let mut body = json!({
            "tool": "ai_smart_query",
            "status": if failed { "error".to_string() } else { success_or(r.status) },
            "input_type": r.input_type,
            "prompt": r.prompt,
            "sql": r.sql,
            "analysis_mode": r.analysis_mode,
            "limit": r.limit,
            "row_count": r.row_count,
            "duration": outcome.duration(),
        });
        put_text(&mut body, "table_name", &r.table_name);
        put_text(&mut body, "alias", &r.alias);
        put_value(&mut body, "result", r.result);
        put_value(&mut body, "raw_result", r.raw_result);
        put_value(&mut body, "columns", r.columns);
        put_value(&mut body, "rows", r.rows);
        put_value(&mut body, "limited", r.limited);
        put_text(&mut body, "ai_analysis", &r.ai_analysis);
        put_text(&mut body, "error", &r.error);
        body
    })))
}

/// SQL generation only; nothing is executed against the database.
#[utoipa::path(post, path = "/api/v1/query", tag = "ai",
    request_body = GenerateSqlRequest,
    responses((status = 200, description = "Generated SQL statement", body = Value))
)]
pub async fn ai_generate_sql(
    State(state): State<AppState>,
    body: Result<Json<GenerateSqlRequest>, JsonRejection>,
) -> HandlerResult {
    let req = json_body(body)?;
    let description = require_text(req.description, "description")?;
    let table_name = non_empty(req.table_name);
    let provider = non_empty(req.provider);
    let model = non_empty(req.model);

    let args = ToolArgs::new()
        .set("description", description.as_str())
        .set_opt("model", model.clone())
        .set_opt("table_schema", non_empty(req.table_schema))
        .set_opt("table_name", table_name.clone())
        .set_opt("provider", provider.clone())
        .with_ai_defaults(&state.ai);
    let outcome = invoke_tool(&state, "ai_generate_sql", args, ANALYSIS_TIMEOUT).await?;

    let (sql, provider, model) = match outcome.result.decode::<GeneratedSqlReply>() {
        ToolPayload::Structured(r) => (r.generated_sql, Some(r.provider), Some(r.model)),
        ToolPayload::Raw(text) => (text, provider, model),
    };

    let mut body = json!({
        "tool": "ai_generate_sql",
        "status": "success",
        "description": description,
        "generated_sql": sql,
        "response_time": outcome.duration(),
        "timestamp": now_rfc3339(),
        "execution": {
            "success": false,
            "message": "SQL generation only. Use /api/v1/ai/smart-sql to execute it.",
        },
    });
    put_text(&mut body, "table_name", table_name.as_deref().unwrap_or(""));
    put_text(&mut body, "provider", provider.as_deref().unwrap_or(""));
    put_text(&mut body, "model", model.as_deref().unwrap_or(""));
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::{Content, ToolCallResult};

    fn outcome(text: &str) -> ToolOutcome {
        ToolOutcome {
            result: ToolCallResult {
                content: vec![Content {
                    kind: "text".into(),
                    text: text.into(),
                }],
                is_error: false,
            },
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn structured_chat_reply_exposes_response() {
        let o = outcome(r#"{"status":"success","response":"hi there","model":"m"}"#);
        let body = reshape("ai_chat", &o, |r: ChatReply| json!({"response": r.response, "model": r.model}));
        assert_eq!(body["response"], "hi there");
        assert_eq!(body["model"], "m");
    }

    #[test]
    fn unparsable_text_falls_back_to_raw() {
        let o = outcome("plain words, not JSON");
        let body = reshape("ai_chat", &o, |_: ChatReply| json!({"unused": true}));
        assert_eq!(body["tool"], "ai_chat");
        assert_eq!(body["status"], "success");
        assert_eq!(body["result"], "plain words, not JSON");
        assert_eq!(body["duration"], "12ms");
    }

    #[test]
    fn put_text_skips_empty_values() {
        let mut body = json!({});
        put_text(&mut body, "provider", "");
        put_text(&mut body, "model", "llama");
        assert_eq!(body, json!({"model": "llama"}));
    }

    #[test]
    fn blank_status_reads_as_success() {
        assert_eq!(success_or(String::new()), "success");
        assert_eq!(success_or("partial".into()), "partial");
    }
}
