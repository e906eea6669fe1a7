use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use mcp_bridge::config::BridgeConfig;
use mcp_bridge::db::SqlStore;
use mcp_bridge::mcp::{memory_transport, McpClient, MemoryPeer};
use mcp_bridge::state::AppState;

fn config() -> BridgeConfig {
    BridgeConfig::from_lookup(|_| None).expect("default config")
}

/// Helper: state with neither database nor MCP session.
fn bare_state() -> AppState {
    AppState::new(&config(), None)
}

/// Helper: state backed by the test MySQL database.
/// Returns None when DATABASE_URL is not set (CI without DB).
async fn try_test_state() -> Option<AppState> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let config = BridgeConfig::from_lookup(|key| std::env::var(key).ok()).expect("config from env");
    let store = SqlStore::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    Some(AppState::new(&config, Some(store)))
}

/// Convenience macro: skip the test when DATABASE_URL is absent.
macro_rules! require_db {
    () => {
        match try_test_state().await {
            Some(s) => s,
            None => {
                eprintln!("Skipping: DATABASE_URL not set");
                return;
            }
        }
    };
}

/// Text a stub tool answers with; most are JSON, some deliberately are not.
fn tool_reply(name: &str, args: &Value) -> Value {
    let text = |t: String| json!({"content": [{"type": "text", "text": t}]});
    match name {
        "ai_chat" => text(
            json!({
                "status": "success",
                "response": "hi there",
                "provider": args["provider"],
                "model": args["model"],
            })
            .to_string(),
        ),
        "ai_smart_query" => text(
            json!({
                "status": "success",
                "input_type": "natural_language",
                "sql": "SELECT * FROM mcp_user",
                "analysis_mode": args["analysis_mode"],
                "limit": args["limit"],
                "table_name": args["table_name"],
                "rows": [{"id": 1, "name": "Alice"}],
                "row_count": 1,
            })
            .to_string(),
        ),
        "ai_query_with_analysis" => text(
            json!({
                "status": "success",
                "description": args["description"],
                "analysis_type": args["analysis_type"],
                "analysis": {"provider": "ollama", "model": "m", "analysis": "mostly engineers"},
            })
            .to_string(),
        ),
        "ai_generate_sql" => text("SELECT COUNT(*) FROM mcp_user".to_string()),
        "ai_analyze_data" => text("plain analysis".to_string()),
        "ai_smart_insights" => json!({
            "content": [{"type": "text", "text": "insights backend offline"}],
            "isError": true,
        }),
        _ => Value::Null,
    }
}

/// Minimal MCP server on the far side of a memory transport.
async fn serve_stub(mut peer: MemoryPeer) {
    while let Some(req) = peer.next_request().await {
        let id = &req["id"];
        match req["method"].as_str() {
            Some("initialize") => {
                peer.reply(
                    id,
                    json!({"protocolVersion": "2024-11-05", "serverInfo": {"name": "stub"}}),
                );
            }
            Some("tools/call") => {
                let name = req["params"]["name"].as_str().unwrap_or_default();
                match tool_reply(name, &req["params"]["arguments"]) {
                    Value::Null => peer.reply_error(id, -32601, "Unknown tool"),
                    result => peer.reply(id, result),
                };
            }
            Some("tools/list") => {
                peer.reply(
                    id,
                    json!({"tools": [
                        {"name": "ai_chat", "description": "chat", "inputSchema": {"type": "object"}},
                        {"name": "ai_smart_query", "description": "sql", "inputSchema": {"type": "object"}},
                    ]}),
                );
            }
            Some("ping") => {
                peer.reply(id, json!({}));
            }
            // notifications/initialized and anything unknown
            _ => {}
        }
    }
}

/// Helper: state with an initialized MCP session backed by the stub.
async fn mcp_state() -> AppState {
    let state = bare_state();
    let (sink, stream, peer) = memory_transport();
    tokio::spawn(serve_stub(peer));
    let client = McpClient::from_transport("memory://stub", sink, stream);
    client
        .initialize(Duration::from_secs(2))
        .await
        .expect("stub handshake");
    state.install_mcp(client).await;
    state
}

/// Helper: build a router from a test state.
fn app(state: AppState) -> axum::Router {
    mcp_bridge::create_router(state)
}

/// Helper: collect a response body into a serde_json::Value.
async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
//  Service availability
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn ai_routes_are_503_without_mcp() {
    let response = app(bare_state())
        .oneshot(post_json("/api/v1/ai/chat", json!({"prompt": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(json["error"]["message"], "MCP service is not available");
}

#[tokio::test]
async fn traditional_routes_are_503_without_database() {
    let response = app(bare_state())
        .oneshot(get("/api/v1/traditional/users"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "Database service is not available");
}

#[tokio::test]
async fn readiness_turns_green_once_mcp_is_initialized() {
    let response = app(mcp_state().await)
        .oneshot(get("/health/ready"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ready"], true);
    assert_eq!(json["mcp"], "initialized");
}

// ═══════════════════════════════════════════════════════════════════════════
//  Request validation
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn invalid_user_id_is_400() {
    let response = app(bare_state())
        .oneshot(get("/api/v1/traditional/users/abc"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_requires_keyword() {
    let response = app(bare_state())
        .oneshot(get("/api/v1/traditional/search/users"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_and_direct_reads_require_table() {
    for uri in ["/api/v1/traditional/stats/users", "/api/v1/user"] {
        let response = app(bare_state()).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn chat_without_prompt_is_400() {
    let response = app(mcp_state().await)
        .oneshot(post_json("/api/v1/ai/chat", json!({"model": "x"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "'prompt' is required");
}

#[tokio::test]
async fn malformed_json_is_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/ai/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app(mcp_state().await).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(
        json["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request format")
    );
}

#[tokio::test]
async fn smart_sql_requires_prompt_or_sql() {
    let response = app(mcp_state().await)
        .oneshot(post_json("/api/v1/ai/smart-sql", json!({"alias": "a"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ═══════════════════════════════════════════════════════════════════════════
//  AI tools over MCP
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn ai_chat_reshapes_structured_reply() {
    let response = app(mcp_state().await)
        .oneshot(post_json("/api/v1/ai/chat", json!({"prompt": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["tool"], "ai_chat");
    assert_eq!(json["status"], "success");
    assert_eq!(json["response"], "hi there");
    // Defaults applied because the request named neither.
    assert_eq!(json["provider"], "ollama");
    assert_eq!(json["model"], "llama2:7b");
    assert!(json["duration"].is_string());
}

#[tokio::test]
async fn smart_query_applies_defaults() {
    let response = app(mcp_state().await)
        .oneshot(post_json(
            "/api/v1/ai/smart-query",
            json!({"description": "all users"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["tool"], "ai_smart_query");
    assert_eq!(json["analysis_mode"], "fast");
    assert_eq!(json["limit"], 100);
    assert_eq!(json["table_name"], "mcp_user");
    assert_eq!(json["rows"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn query_analysis_lifts_analysis_text() {
    let response = app(mcp_state().await)
        .oneshot(post_json(
            "/api/v1/ai/query-analysis",
            json!({"description": "who works here", "analysis_type": "summary"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["analysis"], "mostly engineers");
    assert_eq!(json["provider"], "ollama");
    assert_eq!(json["analysis_type"], "summary");
}

#[tokio::test]
async fn unstructured_tool_text_falls_back_to_raw() {
    let response = app(mcp_state().await)
        .oneshot(post_json("/api/v1/ai/analyze", json!({"data": [1, 2, 3]})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["tool"], "ai_analyze_data");
    assert_eq!(json["status"], "success");
    assert_eq!(json["result"], "plain analysis");
}

#[tokio::test]
async fn generate_sql_never_executes() {
    let response = app(mcp_state().await)
        .oneshot(post_json(
            "/api/v1/query",
            json!({"description": "count users", "table_name": "mcp_user"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["generated_sql"], "SELECT COUNT(*) FROM mcp_user");
    assert_eq!(json["table_name"], "mcp_user");
    assert_eq!(json["execution"]["success"], false);
}

#[tokio::test]
async fn generate_sql_also_answers_legacy_get() {
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/query")
        .header("content-type", "application/json")
        .body(Body::from(json!({"description": "count users"}).to_string()))
        .unwrap();
    let response = app(mcp_state().await).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["generated_sql"], "SELECT COUNT(*) FROM mcp_user");
}

#[tokio::test]
async fn tool_reported_error_is_passed_through() {
    let response = app(mcp_state().await)
        .oneshot(post_json("/api/v1/ai/insights", json!({"prompt": "trends"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "TOOL_FAILED");
    assert_eq!(json["error"]["message"], "insights backend offline");
    assert_eq!(json["error"]["details"]["tool"], "ai_smart_insights");
}

#[tokio::test]
async fn mcp_chat_returns_first_text() {
    let response = app(mcp_state().await)
        .oneshot(post_json("/api/v1/mcp/chat", json!({"prompt": "hi"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["method"], "mcp_ai_chat");
    let inner: Value = serde_json::from_str(json["result"].as_str().unwrap()).unwrap();
    assert_eq!(inner["response"], "hi there");
}

#[tokio::test]
async fn mcp_analyze_works_without_database() {
    let response = app(mcp_state().await)
        .oneshot(get("/api/v1/mcp/analyze?type=age_distribution"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["analysis_type"], "age_distribution");
    assert_eq!(json["result"], "plain analysis");
}

// ═══════════════════════════════════════════════════════════════════════════
//  Comparison
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn capabilities_include_remote_tools() {
    let response = app(mcp_state().await)
        .oneshot(get("/api/v1/comparison/capabilities"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["services"]["mcp"]["tools"], json!(["ai_chat", "ai_smart_query"]));
    assert!(json["services"]["traditional"].is_null());
}

#[tokio::test]
async fn compare_methods_reports_both_paths() {
    let response = app(mcp_state().await)
        .oneshot(get("/api/v1/comparison/methods"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let methods = json["methods"].as_array().unwrap();
    assert_eq!(methods.len(), 2);
    assert_eq!(methods[0]["method"], "direct_database");
    assert_eq!(methods[0]["success"], false);
    assert_eq!(methods[1]["method"], "ai_enhanced");
    assert_eq!(methods[1]["success"], true);
    assert_eq!(methods[1]["data_count"], 1);
    assert_eq!(json["analysis"]["fastest_method"], "ai_enhanced");
    assert_eq!(json["analysis"]["most_reliable"], "ai_enhanced");
}

#[tokio::test]
async fn services_comparison_recommends_enabling_database() {
    let response = app(mcp_state().await)
        .oneshot(get("/api/v1/comparison/services"))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["services"]["traditional"]["available"], false);
    assert_eq!(json["services"]["mcp"]["available"], true);
    assert_eq!(
        json["recommendation"],
        "Only MCP is available; check the database connection"
    );
}

#[tokio::test]
async fn performance_probes_mcp_with_ping() {
    let response = app(mcp_state().await)
        .oneshot(get("/api/v1/comparison/performance"))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["system_status"]["database"], "not_configured");
    assert_eq!(json["system_status"]["mcp"]["status"], "connected");
}

// ═══════════════════════════════════════════════════════════════════════════
//  Database-backed (skipped without DATABASE_URL)
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn traditional_users_returns_data() {
    let state = require_db!();
    let response = app(state)
        .oneshot(get("/api/v1/traditional/users"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["data"].is_array());
    assert_eq!(json["method"], "traditional_database");
}

#[tokio::test]
async fn missing_user_is_404() {
    let state = require_db!();
    let response = app(state)
        .oneshot(get("/api/v1/traditional/users/999999999"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_connected_database() {
    let state = require_db!();
    let response = app(state).oneshot(get("/health")).await.unwrap();

    let json = body_json(response).await;
    assert_eq!(json["services"]["database"], "connected");
}
