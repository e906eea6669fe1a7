// mcp-bridge -- MCP client against a real WebSocket server
//
// Each test binds a one-connection JSON-RPC stub on 127.0.0.1:0 and points
// the client at it, so the full tungstenite path is exercised.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Message;

use mcp_bridge::mcp::{ConnectionState, Handshake, McpClient, McpError, ToolPayload};

const TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Answer everything.
    Normal,
    /// Reject `initialize` with -32000 "Already initialized".
    AlreadyInitialized,
    /// Complete the handshake, then drop the socket on the first tool call.
    HangUpOnCall,
}

/// Serve exactly one WebSocket connection; returns its `ws://` URL.
async fn spawn_stub(behavior: Behavior) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let req: Value = serde_json::from_str(text.as_str()).unwrap();
            let id = req["id"].clone();

            let reply = match (req["method"].as_str(), behavior) {
                (Some("initialize"), Behavior::AlreadyInitialized) => json!({
                    "jsonrpc": "2.0", "id": id,
                    "error": {"code": -32000, "message": "Already initialized"},
                }),
                (Some("initialize"), _) => json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": {"protocolVersion": "2024-11-05", "serverInfo": {"name": "ws-stub"}},
                }),
                (Some("tools/call"), Behavior::HangUpOnCall) => {
                    let _ = ws.close(None).await;
                    return;
                }
                (Some("tools/call"), _) => json!({
                    "jsonrpc": "2.0",
                    // Echo the id as a float, the way generic JSON decoders do.
                    "id": id.as_u64().map(|n| json!(n as f64)).unwrap_or(id),
                    "result": {"content": [{"type": "text",
                        "text": "{\"status\":\"success\",\"response\":\"hi there\"}"}]},
                }),
                (Some("ping"), _) => json!({"jsonrpc": "2.0", "id": id, "result": {}}),
                // Notifications get no reply.
                _ => continue,
            };
            if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                return;
            }
        }
    });

    format!("ws://{addr}/mcp")
}

fn args(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    status: String,
    response: String,
}

#[tokio::test]
async fn handshake_and_tool_call_over_websocket() {
    let url = spawn_stub(Behavior::Normal).await;
    let client = McpClient::connect(&url).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let handshake = client.initialize(TIMEOUT).await.unwrap();
    assert!(matches!(handshake, Handshake::Completed(_)));
    assert_eq!(client.state(), ConnectionState::Initialized);

    let result = client
        .call_tool("ai_chat", args(json!({"prompt": "hello"})), TIMEOUT)
        .await
        .unwrap();
    match result.decode::<ChatReply>() {
        ToolPayload::Structured(reply) => {
            assert_eq!(reply.status, "success");
            assert_eq!(reply.response, "hi there");
        }
        ToolPayload::Raw(text) => panic!("expected structured reply, got {text}"),
    }

    client.ping(TIMEOUT).await.unwrap();
    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn already_initialized_server_counts_as_success() {
    let url = spawn_stub(Behavior::AlreadyInitialized).await;
    let client = McpClient::connect(&url).await.unwrap();

    let handshake = client.initialize(TIMEOUT).await.unwrap();
    assert_eq!(handshake, Handshake::AlreadyInitialized);
    assert!(client.is_initialized());
    client.close().await;
}

#[tokio::test]
async fn server_hang_up_fails_pending_call_promptly() {
    let url = spawn_stub(Behavior::HangUpOnCall).await;
    let client = McpClient::connect(&url).await.unwrap();
    client.initialize(TIMEOUT).await.unwrap();

    let started = std::time::Instant::now();
    let err = client
        .call_tool("ai_chat", Map::new(), Duration::from_secs(30))
        .await
        .unwrap_err();

    assert!(err.is_connection_lost(), "unexpected error: {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(client.state(), ConnectionState::Closed);

    // Later calls fail immediately too.
    assert!(client.ping(TIMEOUT).await.unwrap_err().is_connection_lost());
}

#[tokio::test]
async fn refused_connection_is_a_connection_error() {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = McpClient::connect(&format!("ws://127.0.0.1:{port}/mcp"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, McpError::Connection { .. }));
}

#[tokio::test]
async fn non_websocket_scheme_is_rejected() {
    let err = McpClient::connect("http://localhost:8081/mcp")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, McpError::Connection { .. }));
}
