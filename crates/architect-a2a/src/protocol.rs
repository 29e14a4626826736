//! A2A (Agent-to-Agent) protocol types
//!
//! The subset of the A2A JSON-RPC binding used to talk to agent runtimes:
//! a user message goes out with `message/send`, a task or message comes back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Session header the agent runtime keys conversations on.
pub const SESSION_HEADER: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id";

/// Agent runtimes reject session ids shorter than this.
pub const MIN_SESSION_ID_LEN: usize = 33;

pub mod methods {
    pub const MESSAGE_SEND: &str = "message/send";
}

/// A fresh runtime session id (`session-<uuid>`).
pub fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4())
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// One piece of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
    File { file: Value },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A2A message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub kind: String,
    pub role: Role,
    pub parts: Vec<Part>,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl Message {
    /// A single-part text message from the user.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            kind: "message".to_string(),
            role: Role::User,
            parts: vec![Part::text(text)],
            message_id: Uuid::new_v4().simple().to_string(),
            context_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSendParams {
    pub message: Message,
}

/// JSON-RPC envelope for `message/send`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: MessageSendParams,
}

impl SendMessageRequest {
    pub fn new(message: Message) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Uuid::new_v4().to_string(),
            method: methods::MESSAGE_SEND.to_string(),
            params: MessageSendParams { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_wire_shape() {
        let request = SendMessageRequest::new(Message::user_text("Design a web app"));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "message/send");
        let message = &json["params"]["message"];
        assert_eq!(message["kind"], "message");
        assert_eq!(message["role"], "user");
        assert_eq!(message["parts"][0]["kind"], "text");
        assert_eq!(message["parts"][0]["text"], "Design a web app");
        assert_eq!(message["messageId"].as_str().unwrap().len(), 32);
        assert!(message.get("contextId").is_none());
    }

    #[test]
    fn test_session_id_is_long_enough() {
        let id = new_session_id();
        assert!(id.starts_with("session-"));
        assert!(id.len() >= MIN_SESSION_ID_LEN);
        assert_ne!(id, new_session_id());
    }

    #[test]
    fn test_part_deserialization() {
        let part: Part = serde_json::from_str(r#"{"kind":"data","data":{"k":1}}"#).unwrap();
        assert!(matches!(part, Part::Data { .. }));
    }
}
