// mcp/client -- JSON-RPC 2.0 client over a persistent duplex connection
//! Protocol client for a remote MCP tool server.
//!
//! One [`McpClient`] owns one [`TransportSession`]. Any number of tasks may
//! call it concurrently; each call gets a fresh id, its own deadline and its
//! own waiter in the shared [`Correlator`]. The client never retries: a
//! failed call reports a typed [`McpError`] and the caller decides what to do.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use super::correlator::{Correlator, WaitFailure};
use super::error::McpError;
use super::id::RequestId;
use super::protocol::{
    NotificationEnvelope, Outcome, RequestEnvelope, ToolCallResult, ToolDescriptor, ToolList,
    METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    PROTOCOL_VERSION,
};
use super::transport::{FrameSink, FrameStream, TransportSession};

/// Identity announced in the `initialize` handshake.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "mcp-bridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Initialized,
    Closed,
}

/// Successful outcome of [`McpClient::initialize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Handshake {
    /// Fresh handshake; carries the server's `initialize` result.
    Completed(Value),
    /// The server reported the session was already set up.
    AlreadyInitialized,
}

pub struct McpClient {
    session: TransportSession,
    correlator: Arc<Correlator>,
    next_id: AtomicU64,
    initialized: AtomicBool,
    closed: AtomicBool,
    info: ClientInfo,
}

impl McpClient {
    /// Open a WebSocket to `endpoint`. Does not retry and does not handshake.
    pub async fn connect(endpoint: &str) -> Result<Self, McpError> {
        let correlator = Arc::new(Correlator::new());
        let session = TransportSession::connect(endpoint, Arc::clone(&correlator)).await?;
        Ok(Self::with_session(session, correlator))
    }

    /// Build a client over an existing frame pair (e.g. [`super::memory_transport`]).
    pub fn from_transport(endpoint: &str, sink: FrameSink, stream: FrameStream) -> Self {
        let correlator = Arc::new(Correlator::new());
        let session = TransportSession::from_parts(endpoint, sink, stream, Arc::clone(&correlator));
        Self::with_session(session, correlator)
    }

    fn with_session(session: TransportSession, correlator: Arc<Correlator>) -> Self {
        Self {
            session,
            correlator,
            next_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            info: ClientInfo::default(),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.session.endpoint()
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::SeqCst) || !self.session.is_open() {
            ConnectionState::Closed
        } else if self.initialized.load(Ordering::SeqCst) {
            ConnectionState::Initialized
        } else {
            ConnectionState::Connected
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == ConnectionState::Initialized
    }

    /// Responses the correlator could not match to any outstanding request.
    pub fn dropped_responses(&self) -> u64 {
        self.correlator.dropped_responses()
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// Perform the MCP handshake. A server that answers
    /// `-32000 "Already initialized"` counts as success.
    pub async fn initialize(&self, timeout: Duration) -> Result<Handshake, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": self.info,
        });

        match self.round_trip(METHOD_INITIALIZE, Some(params), timeout).await? {
            Outcome::Result(server) => {
                self.notify(METHOD_INITIALIZED, None).await?;
                self.initialized.store(true, Ordering::SeqCst);
                let server_name = server
                    .pointer("/serverInfo/name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                tracing::info!("MCP: initialized with {} (server: {})", self.endpoint(), server_name);
                Ok(Handshake::Completed(server))
            }
            Outcome::Error(e) if e.is_already_initialized() => {
                self.initialized.store(true, Ordering::SeqCst);
                tracing::info!("MCP: server at {} was already initialized", self.endpoint());
                Ok(Handshake::AlreadyInitialized)
            }
            Outcome::Error(e) => {
                tracing::error!("MCP: initialize rejected: {} - {}", e.code, e.message);
                Err(McpError::Initialization {
                    code: e.code,
                    message: e.message,
                })
            }
        }
    }

    /// Invoke one remote tool and wait for its result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<ToolCallResult, McpError> {
        let params = json!({ "name": name, "arguments": arguments });

        match self.round_trip(METHOD_TOOLS_CALL, Some(params), timeout).await? {
            Outcome::Result(value) => serde_json::from_value(value).map_err(|e| {
                tracing::error!(tool = name, "MCP: tools/call result has unexpected shape: {}", e);
                McpError::Decode {
                    method: METHOD_TOOLS_CALL.to_string(),
                    reason: e.to_string(),
                }
            }),
            Outcome::Error(e) => {
                tracing::warn!(tool = name, "MCP: tool call failed: {} - {}", e.code, e.message);
                Err(McpError::ToolCall {
                    code: e.code,
                    message: e.message,
                    data: e.data,
                })
            }
        }
    }

    pub async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolDescriptor>, McpError> {
        let outcome = self
            .round_trip(METHOD_TOOLS_LIST, Some(json!({})), timeout)
            .await?;
        let value = expect_result(METHOD_TOOLS_LIST, outcome)?;
        serde_json::from_value::<ToolList>(value)
            .map(|list| list.tools)
            .map_err(|e| {
                tracing::error!("MCP: tools/list result has unexpected shape: {}", e);
                McpError::Decode {
                    method: METHOD_TOOLS_LIST.to_string(),
                    reason: e.to_string(),
                }
            })
    }

    /// Liveness probe.
    pub async fn ping(&self, timeout: Duration) -> Result<(), McpError> {
        let outcome = self.round_trip(METHOD_PING, None, timeout).await?;
        expect_result(METHOD_PING, outcome).map(|_| ())
    }

    /// Tear the connection down. Later calls fail with [`McpError::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("MCP: closing connection to {}", self.endpoint());
        self.session.close().await;
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn round_trip(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Outcome, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::Closed);
        }
        if !self.session.is_open() {
            return Err(McpError::Transport("connection is not open".to_string()));
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let envelope = RequestEnvelope::new(id.clone(), method, params);
        let frame = serde_json::to_string(&envelope).map_err(|e| McpError::Encode {
            method: method.to_string(),
            reason: e.to_string(),
        })?;

        let waiter = self
            .correlator
            .register(id.key(), deadline_after(timeout))
            .map_err(|e| self.map_closed(e))?;
        // On failure the waiter is dropped here, which unregisters it.
        self.session.send(frame).await?;
        tracing::debug!(id = %id, method, "MCP: request sent");

        match waiter.wait().await {
            Ok(response) => Ok(response.outcome),
            Err(WaitFailure::TimedOut) => {
                tracing::warn!(id = %id, method, "MCP: no response within {:?}", timeout);
                Err(McpError::Timeout {
                    method: method.to_string(),
                    id: id.to_string(),
                    timeout,
                })
            }
            Err(WaitFailure::Closed(reason)) => Err(self.map_closed(McpError::Transport(reason))),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let frame = serde_json::to_string(&NotificationEnvelope::new(method, params)).map_err(
            |e| McpError::Encode {
                method: method.to_string(),
                reason: e.to_string(),
            },
        )?;
        self.session.send(frame).await
    }

    /// A local `close()` wins over whatever the transport reported.
    fn map_closed(&self, err: McpError) -> McpError {
        if self.closed.load(Ordering::SeqCst) {
            McpError::Closed
        } else {
            err
        }
    }
}

/// Longest a single call may wait; larger timeouts are clamped to it so the
/// deadline never overflows `Instant`.
const MAX_WAIT: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout.min(MAX_WAIT)
}

fn expect_result(method: &str, outcome: Outcome) -> Result<Value, McpError> {
    match outcome {
        Outcome::Result(value) => Ok(value),
        Outcome::Error(e) => Err(McpError::Protocol {
            method: method.to_string(),
            code: e.code,
            message: e.message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use futures_util::future::join_all;
    use serde::Deserialize;

    use super::*;
    use crate::mcp::payload::ToolPayload;
    use crate::mcp::transport::{memory_transport, MemoryPeer};

    fn client() -> (McpClient, MemoryPeer) {
        let (sink, stream, peer) = memory_transport();
        (McpClient::from_transport("memory://mcp", sink, stream), peer)
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
    async fn ai_chat_round_trip_decodes_structured_reply() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            assert_eq!(req["method"], "tools/call");
            assert_eq!(req["params"]["name"], "ai_chat");
            assert_eq!(req["params"]["arguments"]["prompt"], "hello");
            peer.reply(
                &req["id"],
                json!({"content": [{"type": "text",
                    "text": "{\"status\":\"success\",\"response\":\"hi there\"}"}]}),
            );
            peer
        });

        let result = client
            .call_tool("ai_chat", args(json!({"prompt": "hello"})), Duration::from_secs(5))
            .await
            .unwrap();
        let _peer = server.await.unwrap();

        match result.decode::<ChatReply>() {
            ToolPayload::Structured(reply) => {
                assert_eq!(reply.status, "success");
                assert_eq!(reply.response, "hi there");
            }
            ToolPayload::Raw(raw) => panic!("expected structured reply, got {raw}"),
        }
    }

    #[tokio::test]
    async fn fresh_handshake_sends_initialized_notification() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            assert_eq!(req["method"], "initialize");
            assert_eq!(req["params"]["protocolVersion"], PROTOCOL_VERSION);
            assert_eq!(req["params"]["clientInfo"]["name"], "mcp-bridge");
            assert!(req["params"]["capabilities"]["tools"].is_object());
            peer.reply(&req["id"], json!({"serverInfo": {"name": "stub"}}));
            let note = peer.next_request().await.unwrap();
            assert_eq!(note["method"], "notifications/initialized");
            assert!(note.get("id").is_none());
            peer
        });

        assert_eq!(client.state(), ConnectionState::Connected);
        let hs = client.initialize(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(hs, Handshake::Completed(_)));
        let _peer = server.await.unwrap();
        assert!(client.is_initialized());
    }

    #[tokio::test]
    async fn already_initialized_is_success() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            peer.reply_error(&req["id"], -32000, "Already initialized");
            peer
        });

        let hs = client.initialize(Duration::from_secs(5)).await.unwrap();
        assert_eq!(hs, Handshake::AlreadyInitialized);
        assert_eq!(client.state(), ConnectionState::Initialized);
        let _peer = server.await.unwrap();
    }

    #[tokio::test]
    async fn other_handshake_errors_are_typed() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            peer.reply_error(&req["id"], -32000, "Unsupported protocol version");
            peer
        });

        match client.initialize(Duration::from_secs(5)).await {
            Err(McpError::Initialization { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "Unsupported protocol version");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!client.is_initialized());
        let _peer = server.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_call_times_out_after_its_deadline() {
        let (client, _peer) = client();
        let started = Instant::now();
        let err = client
            .call_tool("ai_chat", Map::new(), Duration::from_secs(5))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, McpError::Timeout { .. }), "got {err:?}");
        assert!(elapsed >= Duration::from_secs(5), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(6), "returned late: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn one_timeout_does_not_affect_another_call() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let mut slow_id = None;
            for _ in 0..2 {
                let req = peer.next_request().await.unwrap();
                if req["params"]["name"] == "answered" {
                    slow_id = Some(req["id"].clone());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            peer.reply(
                &slow_id.unwrap(),
                json!({"content": [{"type": "text", "text": "ok"}]}),
            );
            peer
        });

        let started = Instant::now();
        let (a, b) = tokio::join!(
            client.call_tool("ignored", Map::new(), Duration::from_millis(10)),
            async {
                let r = client
                    .call_tool("answered", Map::new(), Duration::from_millis(1000))
                    .await;
                (r, started.elapsed())
            }
        );

        assert!(matches!(a, Err(McpError::Timeout { .. })));
        let (b, b_elapsed) = b;
        assert_eq!(b.unwrap().first_text(), "ok");
        assert!(b_elapsed >= Duration::from_millis(50));
        assert!(b_elapsed < Duration::from_millis(1000));
        let _peer = server.await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_calls_use_distinct_ids_and_get_their_own_answers() {
        const N: usize = 16;
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let mut reqs = Vec::new();
            for _ in 0..N {
                reqs.push(peer.next_request().await.unwrap());
            }
            let ids: HashSet<String> = reqs.iter().map(|r| r["id"].to_string()).collect();
            assert_eq!(ids.len(), N);
            // Answer in reverse order, echoing the tool's argument back.
            for req in reqs.iter().rev() {
                let n = req["params"]["arguments"]["n"].clone();
                peer.reply(
                    &req["id"],
                    json!({"content": [{"type": "text", "text": n.to_string()}]}),
                );
            }
            peer
        });

        let calls = (0..N).map(|n| {
            let client = &client;
            async move {
                let r = client
                    .call_tool("echo", args(json!({"n": n})), Duration::from_secs(5))
                    .await
                    .unwrap();
                (n, r.first_text().to_string())
            }
        });
        for (n, text) in join_all(calls).await {
            assert_eq!(text, n.to_string());
        }
        let _peer = server.await.unwrap();
    }

    #[tokio::test]
    async fn float_echo_of_id_still_matches() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            let id = req["id"].as_u64().unwrap();
            peer.send_frame(format!(
                r#"{{"jsonrpc":"2.0","id":{id}.0,"result":{{"content":[]}}}}"#
            ));
            peer
        });

        let result = client
            .call_tool("noop", Map::new(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result.content.is_empty());
        let _peer = server.await.unwrap();
    }

    #[tokio::test]
    async fn remote_tool_error_is_passed_through() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            peer.reply_error(&req["id"], -32602, "unknown tool: nope");
            peer
        });

        match client.call_tool("nope", Map::new(), Duration::from_secs(5)).await {
            Err(McpError::ToolCall { code, message, .. }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "unknown tool: nope");
            }
            other => panic!("unexpected {other:?}"),
        }
        let _peer = server.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_result_is_a_decode_error() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            peer.reply(&req["id"], json!({"content": "not a list"}));
            peer
        });

        let err = client
            .call_tool("ai_chat", Map::new(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Decode { .. }), "got {err:?}");
        let _peer = server.await.unwrap();
    }

    #[tokio::test]
    async fn unrelated_messages_are_dropped() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            peer.send_frame(r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#);
            peer.reply(&json!(9999), json!({}));
            peer.reply(&req["id"], json!({}));
            peer
        });

        client.ping(Duration::from_secs(5)).await.unwrap();
        let _peer = server.await.unwrap();
        assert_eq!(client.dropped_responses(), 1);
    }

    #[tokio::test]
    async fn list_tools_decodes_descriptors() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            assert_eq!(req["method"], "tools/list");
            peer.reply(
                &req["id"],
                json!({"tools": [{"name": "ai_chat", "description": "chat",
                    "inputSchema": {"type": "object"}}]}),
            );
            peer
        });

        let tools = client.list_tools(Duration::from_secs(5)).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ai_chat");
        let _peer = server.await.unwrap();
    }

    #[tokio::test]
    async fn huge_timeout_is_clamped_instead_of_overflowing() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let req = peer.next_request().await.unwrap();
            peer.reply(&req["id"], json!({"content": [{"type": "text", "text": "ok"}]}));
            peer
        });

        let result = client
            .call_tool("ai_chat", Map::new(), Duration::MAX)
            .await
            .unwrap();
        assert_eq!(result.first_text(), "ok");
        let _peer = server.await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_later_calls_fail() {
        let (client, _peer) = client();
        client.close().await;
        client.close().await;
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(
            client.call_tool("ai_chat", Map::new(), Duration::from_secs(1)).await,
            Err(McpError::Closed)
        ));
    }

    #[tokio::test]
    async fn peer_hang_up_fails_pending_call_promptly() {
        let (client, mut peer) = client();
        let server = tokio::spawn(async move {
            let _req = peer.next_request().await.unwrap();
            peer.hang_up();
            peer
        });

        let started = Instant::now();
        let err = client
            .call_tool("ai_chat", Map::new(), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Transport(_)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(client.state(), ConnectionState::Closed);
        let _peer = server.await.unwrap();
    }
}
