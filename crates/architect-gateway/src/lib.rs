//! architect-gateway — HTTP surface of the Architect gateway
//!
//! Accepts browser calls on `/api/mcp` and `/api/agent/{agentType}`, routes
//! each to exactly one downstream runtime, keeps per-conversation ordering
//! through the session manager and answers `/health` from configuration.

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;

pub use error::ApiError;
pub use router::{Operation, Protocol, ProtocolRouter, Route};
pub use server::{AppState, GatewayServer, build_router};
pub use session::{SessionLease, SessionManager, SessionRecord};
