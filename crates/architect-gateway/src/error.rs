//! HTTP mapping of gateway errors

use architect_core::GatewayError;
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::protocol::ErrorBody;

/// Handler error: a [`GatewayError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl ApiError {
    /// Status for errors raised by the gateway itself.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::Configuration(_) | GatewayError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Credential(_) | GatewayError::Authentication(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Downstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.0 {
            // Downstream failures go back exactly as they came.
            GatewayError::Downstream {
                status: downstream,
                content_type,
                body,
            } => {
                tracing::warn!(status = downstream, bytes = body.len(), "Downstream error passed through");
                let mut response = (status, body).into_response();
                if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                response
            }
            err => {
                if status.is_server_error() {
                    tracing::error!(kind = err.kind(), error = %err, "Gateway error");
                } else {
                    tracing::warn!(kind = err.kind(), error = %err, "Rejected request");
                }
                (status, Json(ErrorBody::from_error(&err))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GatewayError::Configuration("x".into()), StatusCode::BAD_REQUEST),
            (GatewayError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (GatewayError::Credential("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (GatewayError::Authentication("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (GatewayError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
            (GatewayError::Transport("reset".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).into_response().status(), expected);
        }
    }

    #[test]
    fn test_downstream_passthrough() {
        let resp = ApiError(GatewayError::Downstream {
            status: 429,
            content_type: Some("application/json".into()),
            body: Bytes::from_static(b"{\"message\":\"slow down\"}"),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_invalid_downstream_status_is_bad_gateway() {
        let err = ApiError(GatewayError::Downstream {
            status: 1000,
            content_type: None,
            body: Bytes::new(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
