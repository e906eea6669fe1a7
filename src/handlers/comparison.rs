// ---------------------------------------------------------------------------
// handlers/comparison.rs -- Side-by-side views of the database and MCP paths
// ---------------------------------------------------------------------------

use std::time::{Duration, Instant};

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;
use crate::users;

use super::{format_duration, now_rfc3339, ToolArgs};

const METHOD_TIMEOUT: Duration = Duration::from_secs(60);
const LIST_TOOLS_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const MCP_FEATURES: [&str; 4] = ["ai_chat", "ai_data_analysis", "ai_query_analysis", "ai_tools"];

// ---------------------------------------------------------------------------
// Method comparison
// ---------------------------------------------------------------------------

/// Outcome of one query method in a comparison run.
#[derive(Debug, Clone, Serialize)]
pub struct MethodResult {
    pub method: String,
    pub success: bool,
    #[serde(skip)]
    pub elapsed: Duration,
    pub response_time: String,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data_count: usize,
}

impl MethodResult {
    fn succeeded(method: &str, elapsed: Duration, data_count: usize) -> Self {
        Self {
            method: method.to_string(),
            success: true,
            elapsed,
            response_time: format_duration(elapsed),
            response_time_ms: elapsed.as_secs_f64() * 1000.0,
            error: None,
            data_count,
        }
    }

    fn failed(method: &str, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            success: false,
            elapsed,
            response_time: format_duration(elapsed),
            response_time_ms: elapsed.as_secs_f64() * 1000.0,
            error: Some(error.into()),
            data_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonAnalysis {
    pub fastest_method: Option<String>,
    pub slowest_method: Option<String>,
    pub most_reliable: Option<String>,
    pub performance_gap: Option<String>,
    pub recommendation: String,
    pub efficiency_score: f64,
}

/// Score one method: 0.5 for succeeding plus a speed bonus.
fn method_score(result: &MethodResult) -> f64 {
    if !result.success {
        return 0.0;
    }
    let bonus = match result.elapsed {
        d if d < Duration::from_millis(10) => 0.3,
        d if d < Duration::from_millis(100) => 0.2,
        d if d < Duration::from_secs(1) => 0.1,
        _ => 0.0,
    };
    0.5 + bonus
}

/// Fastest/slowest consider successful methods only; `most_reliable` is the
/// first successful method in run order.
pub fn analyze(results: &[MethodResult]) -> ComparisonAnalysis {
    let successes: Vec<&MethodResult> = results.iter().filter(|r| r.success).collect();
    let fastest = successes.iter().min_by_key(|r| r.elapsed);
    let slowest = successes.iter().max_by_key(|r| r.elapsed);

    let performance_gap = match (fastest, slowest) {
        (Some(f), Some(s)) => Some(format_duration(s.elapsed.saturating_sub(f.elapsed))),
        _ => None,
    };

    let recommendation = match fastest.map(|r| r.method.as_str()) {
        Some("direct_database") => "Direct database access is fastest for simple reads",
        Some("ai_enhanced") => "AI-enhanced queries pay off for natural-language access",
        Some(_) => "Pick the method that matches the query's complexity",
        None => "No method succeeded; check database and MCP connectivity",
    };

    let efficiency_score = if results.is_empty() {
        0.0
    } else {
        results.iter().map(method_score).sum::<f64>() / results.len() as f64
    };

    ComparisonAnalysis {
        fastest_method: fastest.map(|r| r.method.clone()),
        slowest_method: slowest.map(|r| r.method.clone()),
        most_reliable: successes.first().map(|r| r.method.clone()),
        performance_gap,
        recommendation: recommendation.to_string(),
        efficiency_score,
    }
}

async fn run_direct(state: &AppState) -> MethodResult {
    const METHOD: &str = "direct_database";
    let start = Instant::now();
    let Some(store) = &state.store else {
        return MethodResult::failed(METHOD, Duration::ZERO, "Database service is not available");
    };
    match store.query_rows(&state.user_table).await {
        Ok(rows) => MethodResult::succeeded(METHOD, start.elapsed(), rows.len()),
        Err(e) => MethodResult::failed(METHOD, start.elapsed(), e.to_string()),
    }
}

/// Row count reported by a smart-query reply, wherever it put the rows.
fn reported_rows(text: &str) -> usize {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return 0;
    };
    ["/rows", "/result/rows"]
        .iter()
        .find_map(|p| value.pointer(p).and_then(Value::as_array))
        .map(Vec::len)
        .unwrap_or(0)
}

async fn run_ai(state: &AppState) -> MethodResult {
    const METHOD: &str = "ai_enhanced";
    let Some(client) = state.mcp_client().await else {
        return MethodResult::failed(METHOD, Duration::ZERO, "MCP service is not available");
    };

    let args = ToolArgs::new()
        .set("prompt", "List all user records")
        .set("analysis_mode", "fast")
        .set("table_name", state.user_table.as_str())
        .with_ai_defaults(&state.ai)
        .into_map();
    let start = Instant::now();
    match client
        .call_tool("ai_smart_query", args, state.call_timeout(METHOD_TIMEOUT))
        .await
    {
        Ok(result) if result.is_error => {
            MethodResult::failed(METHOD, start.elapsed(), result.first_text())
        }
        Ok(result) => {
            MethodResult::succeeded(METHOD, start.elapsed(), reported_rows(result.first_text()))
        }
        Err(e) => MethodResult::failed(METHOD, start.elapsed(), e.to_string()),
    }
}

#[utoipa::path(get, path = "/api/v1/comparison/methods", tag = "comparison",
    responses((status = 200, description = "Concurrent run of both query methods", body = Value))
)]
pub async fn compare_methods(State(state): State<AppState>) -> Json<Value> {
    let (direct, ai) = tokio::join!(run_direct(&state), run_ai(&state));
    let results = vec![direct, ai];
    let analysis = analyze(&results);
    tracing::info!(
        "method comparison: fastest={:?}, efficiency={:.2}",
        analysis.fastest_method,
        analysis.efficiency_score
    );

    Json(json!({
        "timestamp": now_rfc3339(),
        "methods": results,
        "analysis": analysis,
    }))
}

// ---------------------------------------------------------------------------
// Service overviews
// ---------------------------------------------------------------------------

fn recommendation(database: bool, mcp: bool) -> &'static str {
    match (database, mcp) {
        (true, true) => {
            "Both services are available: use the traditional API for speed and MCP for AI features"
        }
        (true, false) => "Only the database is available; enable MCP for AI-enhanced features",
        (false, true) => "Only MCP is available; check the database connection",
        (false, false) => "No service is available; check the configuration",
    }
}

#[utoipa::path(get, path = "/api/v1/comparison/services", tag = "comparison",
    responses((status = 200, description = "Availability of both backends", body = Value))
)]
pub async fn compare_services(State(state): State<AppState>) -> Json<Value> {
    let mut traditional = json!({
        "service_name": "Traditional User Service",
        "available": state.store.is_some(),
    });
    if let (Some(store), Value::Object(map)) = (&state.store, &mut traditional) {
        let start = Instant::now();
        let outcome = users::load_users(store, &state.user_table).await;
        map.insert("success".into(), json!(outcome.is_ok()));
        map.insert("response_time".into(), json!(format_duration(start.elapsed())));
        match outcome {
            Ok(all) => map.insert("data_count".into(), json!(all.len())),
            Err(e) => map.insert("error".into(), json!(e.to_string())),
        };
    }

    let mcp_available = state.mcp_client().await.is_some();
    let mut mcp = json!({
        "service_name": "MCP AI Service",
        "available": mcp_available,
        "status": state.mcp_status().await,
    });
    if let Value::Object(map) = &mut mcp {
        if mcp_available {
            map.insert("features".into(), json!(MCP_FEATURES));
            map.insert(
                "description".into(),
                json!("AI-enhanced service over the Model Context Protocol"),
            );
        } else {
            map.insert("error".into(), json!("MCP service is not available"));
        }
    }

    Json(json!({
        "comparison_time": now_rfc3339(),
        "services": { "traditional": traditional, "mcp": mcp },
        "recommendation": recommendation(state.store.is_some(), mcp_available),
    }))
}

#[utoipa::path(get, path = "/api/v1/comparison/capabilities", tag = "comparison",
    responses((status = 200, description = "Feature matrix, with the remote tool list", body = Value))
)]
pub async fn capabilities(State(state): State<AppState>) -> Json<Value> {
    let mut services = serde_json::Map::new();

    if state.store.is_some() {
        services.insert(
            "traditional".into(),
            json!({
                "name": "Traditional Database Service",
                "available": true,
                "features": ["user listing", "search", "statistics", "raw table reads"],
                "advantages": ["fast", "stable", "low resource use"],
                "best_for": ["high-frequency reads", "real-time data", "simple operations"],
            }),
        );
    }

    if let Some(client) = state.mcp_client().await {
        let mut mcp = json!({
            "name": "MCP AI Service",
            "available": true,
            "features": MCP_FEATURES,
            "advantages": ["AI enhancement", "smart analysis", "natural language"],
            "best_for": ["complex queries", "data analysis", "interactive use"],
        });
        let listing = client
            .list_tools(state.call_timeout(LIST_TOOLS_TIMEOUT))
            .await;
        if let Value::Object(map) = &mut mcp {
            match listing {
                Ok(tools) => {
                    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
                    map.insert("tools".into(), json!(names));
                }
                Err(e) => {
                    tracing::warn!("capabilities: tools/list failed: {}", e);
                    map.insert("tools_error".into(), json!(e.to_string()));
                }
            }
        }
        services.insert("mcp".into(), mcp);
    }

    Json(json!({
        "timestamp": now_rfc3339(),
        "services": services,
    }))
}

#[utoipa::path(get, path = "/api/v1/comparison/performance", tag = "comparison",
    responses((status = 200, description = "Row count, schema and MCP probe", body = Value))
)]
pub async fn performance(State(state): State<AppState>) -> Json<Value> {
    let mut database_status = "not_configured";
    let mut user_count = 0i64;
    let mut table_schema = Vec::new();

    if let Some(store) = &state.store {
        match store.row_count(&state.user_table).await {
            Ok(count) => {
                database_status = "connected";
                user_count = count;
            }
            Err(e) => {
                tracing::warn!("performance: row count failed: {}", e);
                database_status = "disconnected";
            }
        }
        match store.describe_schema(&state.user_table).await {
            Ok(columns) => table_schema = columns,
            Err(e) => tracing::warn!("performance: schema lookup failed: {}", e),
        }
    }

    let mcp_status = match state.mcp_client().await {
        Some(client) => {
            let start = Instant::now();
            match client.ping(state.call_timeout(PROBE_TIMEOUT)).await {
                Ok(()) => json!({
                    "status": "connected",
                    "latency": format_duration(start.elapsed()),
                }),
                Err(e) => json!({ "status": "unresponsive", "error": e.to_string() }),
            }
        }
        None => json!({ "status": state.mcp_status().await }),
    };

    Json(json!({
        "timestamp": now_rfc3339(),
        "system_status": {
            "database": database_status,
            "mcp": mcp_status,
        },
        "database_info": {
            "table": state.user_table,
            "user_count": user_count,
            "table_schema": table_schema,
        },
        "performance_metrics": {
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "available_methods": ["direct_database", "ai_enhanced", "performance_comparison"],
        },
    }))
}
