//! A2A client — sends user messages to agent runtimes

use architect_core::{
    CredentialProvider, Endpoint, GatewayError, GatewayResult, RequestDraft, Transport,
    send_signed,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::protocol::{Message, SESSION_HEADER, SendMessageRequest};

/// Raw reply of an agent runtime.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Parsed JSON body, or the body as a string when it is not JSON.
    pub raw: Value,
    /// Session id echoed by the runtime, if any.
    pub session_id: Option<String>,
}

/// Signed A2A client shared by every agent role.
#[derive(Clone)]
pub struct A2aClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
}

impl A2aClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            credentials,
            timeout,
        }
    }

    /// Send `text` as a user message within `session_id`.
    pub async fn send_message(
        &self,
        endpoint: &Endpoint,
        session_id: &str,
        text: &str,
    ) -> GatewayResult<AgentReply> {
        let request = SendMessageRequest::new(Message::user_text(text));
        let body = serde_json::to_vec(&request)
            .map_err(|e| GatewayError::InvalidRequest(format!("failed to encode message: {}", e)))?;

        info!(
            session = session_id,
            request_id = %request.id,
            "Sending message to agent at {}",
            endpoint.host()
        );
        debug!("Message: {}", truncate(text, 200));

        let draft = RequestDraft::post(&endpoint.url, body)?
            .with_header("content-type", "application/json")
            .with_header("accept", "application/json")
            .with_header(SESSION_HEADER, session_id);

        let response = send_signed(
            self.transport.as_ref(),
            self.credentials.as_ref(),
            endpoint,
            draft,
            self.timeout,
        )
        .await?;

        let is_stream = response
            .content_type()
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let raw = if is_stream {
            last_event(&response.body)
        } else {
            parse_body(&response.body)
        };
        let session_id = response.header(SESSION_HEADER).map(str::to_string);

        debug!(
            status = response.status,
            bytes = response.body.len(),
            "Agent replied"
        );
        Ok(AgentReply { raw, session_id })
    }
}

fn parse_body(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Last JSON `data:` event of a server-sent event stream.
fn last_event(body: &[u8]) -> Value {
    let text = String::from_utf8_lossy(body);
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
        .last()
        .unwrap_or_else(|| Value::String(text.into_owned()))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
