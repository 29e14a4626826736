//! MCP JSON-RPC protocol types
//!
//! Only as much of the protocol as the gateway needs to recognise a
//! forwardable payload. Bodies are forwarded byte-for-byte.

use architect_core::{GatewayError, GatewayResult};
use bytes::Bytes;
use serde_json::Value;

/// Continuity header between the gateway and the tool endpoint.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Media types a streamable-HTTP MCP server may answer with.
pub const ACCEPT: &str = "application/json, text/event-stream";

/// Methods a client may send to an MCP server.
pub const METHODS: &[&str] = &[
    "initialize",
    "ping",
    "tools/list",
    "tools/call",
    "resources/list",
    "resources/read",
    "resources/templates/list",
    "resources/subscribe",
    "resources/unsubscribe",
    "prompts/list",
    "prompts/get",
    "completion/complete",
    "logging/setLevel",
];

const NOTIFICATION_PREFIX: &str = "notifications/";

/// Whether `method` is something a client may send to an MCP server.
pub fn is_known_method(method: &str) -> bool {
    METHODS.contains(&method) || method.starts_with(NOTIFICATION_PREFIX)
}

/// A validated tool-protocol payload, kept in its original byte form.
#[derive(Debug, Clone)]
pub struct ToolOperation {
    methods: Vec<String>,
    body: Bytes,
}

impl ToolOperation {
    /// Accept a single JSON-RPC message or a non-empty batch of them.
    ///
    /// Requests must name a method MCP servers understand. Responses
    /// (replies to server-initiated requests) pass through as-is.
    pub fn parse(body: Bytes) -> GatewayResult<Self> {
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::InvalidRequest(format!("payload is not JSON: {}", e)))?;

        let messages = match &value {
            Value::Object(_) => vec![&value],
            Value::Array(items) if !items.is_empty() => items.iter().collect(),
            Value::Array(_) => {
                return Err(GatewayError::InvalidRequest("empty JSON-RPC batch".into()));
            }
            _ => {
                return Err(GatewayError::InvalidRequest(
                    "payload must be a JSON-RPC object or batch".into(),
                ));
            }
        };

        let mut methods = Vec::with_capacity(messages.len());
        for message in messages {
            if message.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
                return Err(GatewayError::InvalidRequest(
                    "message is missing \"jsonrpc\": \"2.0\"".into(),
                ));
            }
            match message.get("method") {
                Some(Value::String(method)) if is_known_method(method) => {
                    methods.push(method.clone())
                }
                Some(Value::String(method)) => {
                    return Err(GatewayError::InvalidRequest(format!(
                        "unsupported MCP method '{}'",
                        method
                    )));
                }
                Some(_) => {
                    return Err(GatewayError::InvalidRequest("method must be a string".into()));
                }
                None if message.get("result").is_some() || message.get("error").is_some() => {}
                None => {
                    return Err(GatewayError::InvalidRequest(
                        "message has neither a method nor a result".into(),
                    ));
                }
            }
        }

        Ok(Self { methods, body })
    }

    /// Methods carried by the payload, in order.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}
