//! Protocol routing — which downstream runtime serves an inbound call
//!
//! The table is built once from configuration. Lookups never touch the
//! network, so a missing mapping fails before anything is signed.

use architect_core::{AgentRole, Endpoint, GatewayConfig, GatewayError, GatewayResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;

/// Downstream protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// MCP over HTTP
    Tool,
    /// A2A `message/send`
    Agent,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// An inbound client operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ToolCall,
    /// Agent message addressed by the role selector from the URL.
    AgentMessage { role: String },
}

/// Where an operation goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub protocol: Protocol,
    pub endpoint: Endpoint,
    pub role: Option<AgentRole>,
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolRouter {
    tool: Option<Endpoint>,
    agents: BTreeMap<AgentRole, Endpoint>,
}

impl ProtocolRouter {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let router = Self {
            tool: config.tool.clone(),
            agents: config
                .agents
                .iter()
                .map(|(role, descriptor)| (*role, descriptor.endpoint.clone()))
                .collect(),
        };
        for line in router.describe() {
            info!("Route: {}", line);
        }
        router
    }

    pub fn route(&self, operation: &Operation) -> GatewayResult<Route> {
        match operation {
            Operation::ToolCall => {
                let endpoint = self.tool.clone().ok_or_else(|| {
                    GatewayError::Configuration("tool mode is not configured".into())
                })?;
                Ok(Route {
                    protocol: Protocol::Tool,
                    endpoint,
                    role: None,
                })
            }
            Operation::AgentMessage { role } => {
                let role = AgentRole::from_str(role)?;
                let endpoint = self.agents.get(&role).cloned().ok_or_else(|| {
                    GatewayError::Configuration(format!("agent role '{}' is not configured", role))
                })?;
                Ok(Route {
                    protocol: Protocol::Agent,
                    endpoint,
                    role: Some(role),
                })
            }
        }
    }

    /// One line per configured route, for startup logs.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(tool) = &self.tool {
            lines.push(format!("tool -> {}", tool.host()));
        }
        for (role, endpoint) in &self.agents {
            lines.push(format!("agent/{} -> {}", role, endpoint.host()));
        }
        lines
    }
}
