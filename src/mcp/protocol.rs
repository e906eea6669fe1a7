// mcp/protocol -- JSON-RPC 2.0 envelopes and MCP payload shapes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::RequestId;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_PING: &str = "ping";

/// Error code + message a server sends when `initialize` is repeated on a
/// session it already set up. Treated as a successful handshake.
pub const ALREADY_INITIALIZED_CODE: i64 = -32000;
pub const ALREADY_INITIALIZED_MESSAGE: &str = "Already initialized";

// ── Outgoing ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestEnvelope {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// A request without an id; the server never answers it.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEnvelope {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl NotificationEnvelope {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

// ── Incoming ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn is_already_initialized(&self) -> bool {
        self.code == ALREADY_INITIALIZED_CODE && self.message == ALREADY_INITIALIZED_MESSAGE
    }
}

/// Exactly one of result / error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    /// Raw wire id; may differ in representation from what was sent.
    pub id: Value,
    pub outcome: Outcome,
}

impl ResponseEnvelope {
    /// Build a response from a decoded JSON object.
    ///
    /// A present, non-null `error` wins over `result`; a frame with neither is
    /// rejected.
    pub fn from_object(mut obj: Map<String, Value>) -> Result<Self, String> {
        let id = obj.remove("id").unwrap_or(Value::Null);
        match obj.remove("error") {
            Some(err) if !err.is_null() => {
                let err: RpcError = serde_json::from_value(err)
                    .map_err(|e| format!("invalid error object: {e}"))?;
                Ok(Self {
                    id,
                    outcome: Outcome::Error(err),
                })
            }
            _ => match obj.remove("result") {
                Some(result) => Ok(Self {
                    id,
                    outcome: Outcome::Result(result),
                }),
                None => Err("envelope carries neither result nor error".to_string()),
            },
        }
    }
}

/// Classification of one inbound frame.
#[derive(Debug)]
pub enum Inbound {
    Response(ResponseEnvelope),
    /// Server-initiated request or notification.
    ServerMessage { method: String },
}

/// Parse one text frame.
pub fn parse_frame(frame: &str) -> Result<Inbound, String> {
    let value: Value = serde_json::from_str(frame).map_err(|e| format!("invalid JSON: {e}"))?;
    let Value::Object(obj) = value else {
        return Err("frame is not a JSON object".to_string());
    };
    let is_response = obj.contains_key("result") || obj.contains_key("error");
    if !is_response {
        if let Some(method) = obj.get("method").and_then(Value::as_str) {
            return Ok(Inbound::ServerMessage {
                method: method.to_string(),
            });
        }
    }
    ResponseEnvelope::from_object(obj).map(Inbound::Response)
}

// ── MCP payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<Content>,
    #[serde(default, rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// Entry of a `tools/list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ToolList {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_wire_fields() {
        let env = RequestEnvelope::new(
            RequestId::Number(3),
            METHOD_TOOLS_CALL,
            Some(json!({"name": "ai_chat", "arguments": {"prompt": "hi"}})),
        );
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], 3);
        assert_eq!(v["method"], "tools/call");
        assert_eq!(v["params"]["arguments"]["prompt"], "hi");
    }

    #[test]
    fn notification_has_no_id() {
        let v = serde_json::to_value(NotificationEnvelope::new(METHOD_INITIALIZED, None)).unwrap();
        assert!(v.get("id").is_none());
        assert!(v.get("params").is_none());
    }

    #[test]
    fn parses_success_and_error_responses() {
        let Inbound::Response(ok) = parse_frame(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap()
        else {
            panic!("expected response");
        };
        assert_eq!(ok.outcome, Outcome::Result(json!({})));

        let Inbound::Response(err) = parse_frame(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32000,"message":"Already initialized"}}"#,
        )
        .unwrap() else {
            panic!("expected response");
        };
        match err.outcome {
            Outcome::Error(e) => assert!(e.is_already_initialized()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn null_result_is_still_a_result() {
        let Inbound::Response(resp) = parse_frame(r#"{"id":5,"result":null}"#).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.outcome, Outcome::Result(Value::Null));
    }

    #[test]
    fn server_messages_are_classified() {
        match parse_frame(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{}}"#) {
            Ok(Inbound::ServerMessage { method }) => assert_eq!(method, "notifications/progress"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_frame("not json").is_err());
        assert!(parse_frame("[1,2]").is_err());
        assert!(parse_frame(r#"{"id":1}"#).is_err());
    }

    #[test]
    fn tool_result_tolerates_missing_text() {
        let r: ToolCallResult =
            serde_json::from_value(json!({"content": [{"type": "image"}]})).unwrap();
        assert_eq!(r.content[0].text, "");
        assert!(!r.is_error);
    }
}
