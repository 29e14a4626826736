//! MCP client — forwards validated tool payloads to a signed HTTP endpoint

use architect_core::{
    CredentialProvider, Endpoint, GatewayResult, RequestDraft, Transport, send_signed,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::protocol::{ACCEPT, SESSION_HEADER, ToolOperation};

/// What came back from the tool endpoint.
#[derive(Debug, Clone)]
pub struct ToolReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    /// Continuity token the endpoint handed back, if any.
    pub session_id: Option<String>,
}

/// Signed pass-through client for one or more MCP endpoints.
#[derive(Clone)]
pub struct McpClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
}

impl McpClient {
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

    /// Forward `operation` to `endpoint`, attaching `session_id` when given.
    pub async fn forward(
        &self,
        endpoint: &Endpoint,
        operation: &ToolOperation,
        session_id: Option<&str>,
    ) -> GatewayResult<ToolReply> {
        info!(
            methods = ?operation.methods(),
            session = session_id.unwrap_or("-"),
            "Forwarding tool call to {}",
            endpoint.host()
        );

        let mut draft = RequestDraft::post(&endpoint.url, operation.body().clone())?
            .with_header("content-type", "application/json")
            .with_header("accept", ACCEPT);
        if let Some(session_id) = session_id {
            draft = draft.with_header(SESSION_HEADER, session_id);
        }

        let response = send_signed(
            self.transport.as_ref(),
            self.credentials.as_ref(),
            endpoint,
            draft,
            self.timeout,
        )
        .await?;

        let session_id = response
            .header(SESSION_HEADER)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        debug!(
            status = response.status,
            bytes = response.body.len(),
            session = session_id.as_deref().unwrap_or("-"),
            "Tool endpoint replied"
        );

        Ok(ToolReply {
            status: response.status,
            content_type: response.content_type().map(str::to_string),
            body: response.body,
            session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use architect_core::{
        GatewayError, RecordingTransport, SigningIdentity, StaticCredentials, TransportResponse,
    };
    use url::Url;

    fn client(transport: Arc<RecordingTransport>) -> McpClient {
        McpClient::new(
            transport,
            Arc::new(StaticCredentials::new(SigningIdentity::new("AKIAMCP", "secret"))),
            Duration::from_secs(5),
        )
    }

    fn endpoint() -> Endpoint {
        Endpoint::new(
            Url::parse("https://tools.example.com/mcp").unwrap(),
            "bedrock-agentcore",
            "us-east-1",
        )
    }

    fn ping() -> ToolOperation {
        ToolOperation::parse(Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .unwrap()
    }

    #[tokio::test]
    async fn test_forward_attaches_session_and_signs() {
        let transport = Arc::new(RecordingTransport::replying(
            TransportResponse::new(200)
                .with_header("mcp-session-id", "tok-2")
                .with_body("{}"),
        ));
        let reply = client(transport.clone())
            .forward(&endpoint(), &ping(), Some("tok-1"))
            .await
            .unwrap();

        assert_eq!(reply.session_id.as_deref(), Some("tok-2"));
        let sent = &transport.requests()[0];
        assert_eq!(sent.header("mcp-session-id"), Some("tok-1"));
        assert_eq!(sent.header("accept"), Some(ACCEPT));
        assert!(sent.header("authorization").unwrap().contains("SignedHeaders="));
        assert!(sent.header("authorization").unwrap().contains("mcp-session-id"));
    }

    #[tokio::test]
    async fn test_forward_without_session() {
        let transport = Arc::new(RecordingTransport::replying(TransportResponse::new(202)));
        let reply = client(transport.clone())
            .forward(&endpoint(), &ping(), None)
            .await
            .unwrap();
        assert_eq!(reply.status, 202);
        assert!(reply.session_id.is_none());
        assert!(transport.requests()[0].header("mcp-session-id").is_none());
    }

    #[tokio::test]
    async fn test_downstream_error_passes_through() {
        let transport = Arc::new(RecordingTransport::replying(
            TransportResponse::new(404).with_body("session not found"),
        ));
        let err = client(transport)
            .forward(&endpoint(), &ping(), Some("gone"))
            .await
            .unwrap_err();
        match err {
            GatewayError::Downstream { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(&body[..], b"session not found");
            }
            other => panic!("expected downstream error, got {:?}", other),
        }
    }
}
