//! Request handlers for the gateway's HTTP endpoints

use architect_a2a::normalize;
use architect_a2a::protocol::MIN_SESSION_ID_LEN;
use architect_core::{GatewayError, HealthReport, introspect};
use architect_mcp::ToolOperation;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::protocol::{AgentRequest, AgentResponse, CLIENT_SESSION_HEADER};
use crate::router::{Operation, Protocol};
use crate::server::AppState;

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(introspect(&state.config))
}

/// `POST /api/mcp`: signed pass-through to the tool endpoint.
pub async fn tool(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let route = state.router.route(&Operation::ToolCall)?;
    let operation = ToolOperation::parse(body)?;

    let client_session = match headers.get(CLIENT_SESSION_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| GatewayError::InvalidRequest("X-Session-Id is not valid text".into()))?
                .to_string(),
        ),
        None => None,
    };

    let lease = match client_session.as_deref() {
        Some(id) => Some(state.sessions.acquire(Protocol::Tool, id).await?),
        None => None,
    };

    // The lease moves into the task so a client disconnect cannot end the turn
    // before the runtime has answered or timed out.
    let turn = {
        let state = state.clone();
        tokio::spawn(async move {
            let current = lease.as_ref().map(|l| l.id().to_string());
            let result = state
                .mcp
                .forward(&route.endpoint, &operation, current.as_deref())
                .await;
            let session = match result.as_ref().map(|reply| reply.session_id.as_deref()) {
                Ok(Some(token)) if current.as_deref() != Some(token) => {
                    adopt_token(&state, Protocol::Tool, token).await.or(current)
                }
                _ => current,
            };
            drop(lease);
            (result, session)
        })
    };
    let (result, session) = turn.await.map_err(turn_failed)?;

    let mut response = match result {
        Ok(reply) => {
            let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);
            let mut response = (status, reply.body).into_response();
            let content_type = reply.content_type.as_deref().unwrap_or("application/json");
            if let Ok(value) = HeaderValue::from_str(content_type) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
        Err(err) => ApiError(err).into_response(),
    };
    if let Some(token) = session {
        match HeaderValue::from_str(&token) {
            Ok(value) => {
                response.headers_mut().insert(CLIENT_SESSION_HEADER, value);
            }
            Err(_) => warn!("Session token is not a valid header value, not returned"),
        }
    }
    Ok(response)
}

/// `POST /api/agent/{agentType}`: one user message to an agent role.
pub async fn agent(
    State(state): State<Arc<AppState>>,
    Path(agent_type): Path<String>,
    body: Bytes,
) -> Result<Json<AgentResponse>, ApiError> {
    let route = state.router.route(&Operation::AgentMessage { role: agent_type })?;

    let request: AgentRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid agent request: {}", e)))?;
    if request.message.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("message cannot be empty".into()).into());
    }

    let lease = state.sessions.begin_agent(request.session_id.as_deref()).await?;
    debug!(
        role = ?route.role,
        session = lease.id(),
        new = lease.is_new(),
        "Agent turn started"
    );

    let turn = {
        let state = state.clone();
        tokio::spawn(async move {
            let result = state
                .a2a
                .send_message(&route.endpoint, lease.id(), &request.message)
                .await;
            let mut session_id = lease.id().to_string();
            if let Ok(reply) = &result
                && let Some(token) = reply.session_id.as_deref()
                && token != session_id
                && let Some(token) = adopt_token(&state, Protocol::Agent, token).await
            {
                session_id = token;
            }
            drop(lease);
            (result, session_id)
        })
    };
    let (result, session_id) = turn.await.map_err(turn_failed)?;
    let reply = result?;

    let normalized = normalize(&reply.raw);
    if !normalized.is_success() {
        warn!(session = %session_id, "Agent replied with a JSON-RPC error");
    }
    Ok(Json(AgentResponse::new(reply.raw, normalized, session_id)))
}

/// Track a session token a runtime handed back.
///
/// Returns the token when the client can present it on its next call.
async fn adopt_token(state: &AppState, protocol: Protocol, token: &str) -> Option<String> {
    if protocol == Protocol::Agent && token.trim().len() < MIN_SESSION_ID_LEN {
        warn!(%protocol, "Runtime session id is shorter than {} characters, keeping ours", MIN_SESSION_ID_LEN);
        return None;
    }
    match state.sessions.register(protocol, token).await {
        Ok(token) => {
            info!(%protocol, session = %token, "Runtime issued a session token");
            Some(token)
        }
        Err(e) => {
            warn!(%protocol, "Ignoring unusable session token from runtime: {}", e);
            None
        }
    }
}

fn turn_failed(err: JoinError) -> GatewayError {
    GatewayError::Transport(format!("downstream call aborted: {}", err))
}
