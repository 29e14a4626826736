//! Gateway HTTP protocol — JSON bodies and headers exchanged with the browser

use architect_a2a::NormalizedResponse;
use architect_core::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Continuity header between the browser and the gateway (tool protocol).
pub const CLIENT_SESSION_HEADER: &str = "x-session-id";

/// Body of `POST /api/agent/{agentType}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Reply to `POST /api/agent/{agentType}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub success: bool,
    pub response: String,
    pub raw: Value,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
}

impl AgentResponse {
    /// Assemble the reply. `raw` is carried through untouched.
    pub fn new(raw: Value, normalized: NormalizedResponse, session_id: String) -> Self {
        let success = normalized.is_success();
        let response = match normalized.error {
            Some(error) if normalized.text.is_empty() => error,
            _ => normalized.text,
        };
        Self {
            success,
            response,
            raw,
            session_id,
            template: normalized.template,
            overview: normalized.overview,
            review: normalized.review,
            cost: normalized.cost,
        }
    }
}

/// Error body for failures raised by the gateway itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub kind: String,
    /// Whether sending the same request again could succeed.
    pub retryable: bool,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            kind: kind.into(),
            retryable: false,
        }
    }

    pub fn from_error(err: &GatewayError) -> Self {
        Self {
            retryable: err.is_retryable(),
            ..Self::new(err.to_string(), err.kind())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use architect_a2a::normalize;
    use serde_json::json;

    #[test]
    fn test_agent_request_camel_case() {
        let req: AgentRequest =
            serde_json::from_str(r#"{"message":"hi","sessionId":"abc"}"#).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("abc"));

        let req: AgentRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(req.session_id.is_none());
    }

    #[test]
    fn test_agent_response_omits_missing_sections() {
        let raw = json!({"result": {"parts": [{"kind": "text", "text": "hello"}]}});
        let resp = AgentResponse::new(raw.clone(), normalize(&raw), "session-1".into());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["response"], "hello");
        assert_eq!(json["sessionId"], "session-1");
        assert_eq!(json["raw"], raw);
        assert!(json.get("template").is_none());
        assert!(json.get("cost").is_none());
    }

    #[test]
    fn test_agent_error_becomes_response_text() {
        let raw = json!({"jsonrpc": "2.0", "id": "1", "error": {"code": -32000, "message": "agent crashed"}});
        let resp = AgentResponse::new(raw.clone(), normalize(&raw), "s".into());
        assert!(!resp.success);
        assert_eq!(resp.response, "agent crashed");
    }

    #[test]
    fn test_error_body() {
        let json = serde_json::to_value(ErrorBody::new("nope", "configuration")).unwrap();
        assert_eq!(
            json,
            json!({"success": false, "error": "nope", "kind": "configuration", "retryable": false})
        );
    }

    #[test]
    fn test_error_body_retry_hint() {
        let timeout = ErrorBody::from_error(&GatewayError::Timeout(std::time::Duration::from_secs(5)));
        assert!(timeout.retryable);
        assert_eq!(timeout.kind, "timeout");

        let bad = ErrorBody::from_error(&GatewayError::InvalidRequest("no".into()));
        assert!(!bad.retryable);
    }
}
