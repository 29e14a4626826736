//! architect-core — shared plumbing for the Architect gateway
//!
//! Holds everything that is protocol-agnostic: the immutable gateway
//! configuration, the error taxonomy, credential resolution, SigV4 request
//! signing, the outbound HTTP transport and configuration-only health
//! introspection.

pub mod config;
pub mod credentials;
pub mod error;
pub mod health;
pub mod signing;
pub mod transport;

pub use config::{AgentDescriptor, AgentRole, Endpoint, GatewayConfig, MapEnv, ReadEnv, SystemEnv};
pub use credentials::{
    AmbientCredentials, CredentialProvider, CredentialSource, SigningIdentity, StaticCredentials,
};
pub use error::{GatewayError, GatewayResult};
pub use health::{HealthReport, HealthStatus, introspect};
pub use signing::{RequestDraft, SignedRequest};
pub use transport::{HttpTransport, Transport, TransportResponse, send_signed};

#[cfg(any(test, feature = "test-support"))]
pub use transport::RecordingTransport;
