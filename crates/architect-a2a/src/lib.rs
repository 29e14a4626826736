//! A2A (Agent-to-Agent) support for the Architect gateway
//!
//! Sends `message/send` calls to agent runtimes over signed HTTP and turns
//! whatever shape comes back into one text value plus optional sections.

pub mod client;
pub mod normalize;
pub mod protocol;

pub use client::{A2aClient, AgentReply};
pub use normalize::{NormalizedResponse, normalize};
pub use protocol::{Message, Part, Role, SESSION_HEADER, SendMessageRequest, new_session_id};
