//! MCP (Model Context Protocol) pass-through for the Architect gateway
//!
//! The gateway does not interpret tool calls. It checks that a payload is
//! an MCP JSON-RPC message, signs it and forwards it to the configured tool
//! endpoint, carrying the `Mcp-Session-Id` continuity token both ways.

pub mod client;
pub mod protocol;

pub use client::{McpClient, ToolReply};
pub use protocol::{SESSION_HEADER, ToolOperation};
