// mcp/payload -- two-stage decode of tool result text
//! Tool results carry opaque text that is usually, but not always, JSON.
//! [`ToolPayload`] makes the fallback explicit: a structured decode into the
//! caller's expected shape, or the raw text when that fails.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::protocol::ToolCallResult;

#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload<T> {
    Structured(T),
    Raw(String),
}

impl<T: DeserializeOwned> ToolPayload<T> {
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<T>(text) {
            Ok(value) => ToolPayload::Structured(value),
            Err(e) => {
                tracing::debug!("MCP: tool payload is not structured ({}), keeping raw text", e);
                ToolPayload::Raw(text.to_string())
            }
        }
    }
}

impl<T> ToolPayload<T> {
    pub fn structured(&self) -> Option<&T> {
        match self {
            ToolPayload::Structured(v) => Some(v),
            ToolPayload::Raw(_) => None,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ToolPayload::Structured(_))
    }
}

impl<T: Serialize> ToolPayload<T> {
    /// JSON view of either variant; raw text becomes a JSON string.
    pub fn to_json(&self) -> Value {
        match self {
            ToolPayload::Structured(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            ToolPayload::Raw(s) => Value::String(s.clone()),
        }
    }
}

impl ToolCallResult {
    /// Text of the first content item; empty when there is none.
    pub fn first_text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or("")
    }

    /// Decode the first content item's text.
    pub fn decode<T: DeserializeOwned>(&self) -> ToolPayload<T> {
        if self.content.is_empty() {
            return ToolPayload::Raw(String::new());
        }
        ToolPayload::from_text(self.first_text())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::mcp::protocol::Content;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct ChatReply {
        status: String,
        response: String,
    }

    fn text_result(text: &str) -> ToolCallResult {
        ToolCallResult {
            content: vec![Content {
                kind: "text".into(),
                text: text.into(),
            }],
            is_error: false,
        }
    }

    #[test]
    fn structured_text_decodes() {
        let r = text_result(r#"{"status":"success","response":"hi there"}"#);
        match r.decode::<ChatReply>() {
            ToolPayload::Structured(reply) => assert_eq!(reply.response, "hi there"),
            other => panic!("expected structured, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_falls_back_to_raw() {
        let r = text_result("SELECT * FROM users;");
        assert_eq!(
            r.decode::<ChatReply>(),
            ToolPayload::Raw("SELECT * FROM users;".into())
        );
    }

    #[test]
    fn json_of_the_wrong_shape_falls_back_to_raw() {
        let r = text_result(r#"{"unexpected": 1}"#);
        assert!(!r.decode::<ChatReply>().is_structured());
        // ...but decodes fine when the caller accepts any JSON.
        assert_eq!(
            r.decode::<Value>().structured(),
            Some(&json!({"unexpected": 1}))
        );
    }

    #[test]
    fn empty_content_is_empty_raw() {
        let r = ToolCallResult {
            content: vec![],
            is_error: false,
        };
        assert_eq!(r.first_text(), "");
        assert_eq!(r.decode::<Value>(), ToolPayload::Raw(String::new()));
    }

    #[test]
    fn json_view_of_raw_is_a_string() {
        let p: ToolPayload<Value> = ToolPayload::Raw("plain".into());
        assert_eq!(p.to_json(), json!("plain"));
    }
}
