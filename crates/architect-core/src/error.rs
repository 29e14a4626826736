//! Error taxonomy shared by every gateway component.

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Every failure a gateway request can end in.
///
/// The variants map one-to-one onto the HTTP behaviour of the gateway:
/// configuration and request-shape problems are the caller's to fix,
/// credential and signing problems are the operator's, downstream failures
/// are passed through untouched and timeouts stay distinguishable from them.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// A required endpoint or role mapping is missing. No network call was made.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client sent something the gateway cannot forward.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No signing identity could be resolved from the environment.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Signing failed for an identity that did resolve.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The signed call reached its target and came back with a non-success status.
    #[error("Downstream returned HTTP {status}")]
    Downstream {
        status: u16,
        content_type: Option<String>,
        body: Bytes,
    },

    /// The bounded wait on an outbound call expired.
    #[error("Downstream call timed out after {0:?}")]
    Timeout(Duration),

    /// The outbound call never produced a response (connect/reset/TLS failure).
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Stable machine-readable name, used in JSON error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Credential(_) => "credential",
            Self::Authentication(_) => "authentication",
            Self::Downstream { .. } => "downstream",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
        }
    }

    /// Whether a caller could reasonably retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Downstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(GatewayError::Configuration("x".into()).kind(), "configuration");
        assert_eq!(GatewayError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        let downstream = GatewayError::Downstream {
            status: 502,
            content_type: None,
            body: Bytes::new(),
        };
        assert_eq!(downstream.kind(), "downstream");
    }

    #[test]
    fn test_timeout_is_distinct_from_downstream() {
        let timeout = GatewayError::Timeout(Duration::from_secs(30));
        assert!(timeout.to_string().contains("timed out"));
        assert!(!matches!(timeout, GatewayError::Downstream { .. }));
    }

    #[test]
    fn test_retryable() {
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(GatewayError::Transport("reset".into()).is_retryable());
        assert!(
            GatewayError::Downstream {
                status: 503,
                content_type: None,
                body: Bytes::new()
            }
            .is_retryable()
        );
        assert!(
            !GatewayError::Downstream {
                status: 400,
                content_type: None,
                body: Bytes::new()
            }
            .is_retryable()
        );
        assert!(!GatewayError::Configuration("missing".into()).is_retryable());
        assert!(!GatewayError::Credential("none".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_status() {
        let err = GatewayError::Downstream {
            status: 418,
            content_type: Some("text/plain".into()),
            body: Bytes::from_static(b"teapot"),
        };
        assert_eq!(err.to_string(), "Downstream returned HTTP 418");
    }
}
