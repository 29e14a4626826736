//! Health introspection — availability derived from configuration alone
//!
//! Nothing here touches the network. A mode is "available" when the
//! gateway knows where to send it; whether the target is up is the
//! caller's problem.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{AgentRole, GatewayConfig};

/// Overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Both modes configured.
    Ok,
    /// Exactly one mode configured.
    Degraded,
    /// Nothing to forward to.
    Unconfigured,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "OK"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unconfigured => write!(f, "UNCONFIGURED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolModeHealth {
    pub available: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentModeHealth {
    pub available: bool,
    pub roles: BTreeMap<AgentRole, bool>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModesHealth {
    pub tool_mode: ToolModeHealth,
    pub agent_mode: AgentModeHealth,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub region: String,
    pub modes: ModesHealth,
}

impl HealthReport {
    pub fn tool_mode_available(&self) -> bool {
        self.modes.tool_mode.available
    }

    pub fn agent_mode_available(&self) -> bool {
        self.modes.agent_mode.available
    }

    pub fn role_available(&self, role: AgentRole) -> bool {
        self.modes.agent_mode.roles.get(&role).copied().unwrap_or(false)
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: tool mode {}, agent mode {}",
            self.status,
            if self.tool_mode_available() { "available" } else { "unavailable" },
            if self.agent_mode_available() { "available" } else { "unavailable" },
        )
    }
}

/// Build the health report for `config`.
pub fn introspect(config: &GatewayConfig) -> HealthReport {
    let tool_mode = match &config.tool {
        Some(endpoint) => ToolModeHealth {
            available: true,
            detail: format!("tool endpoint configured at {}", endpoint.host()),
        },
        None => ToolModeHealth {
            available: false,
            detail: "no tool endpoint configured (set MCP_ENDPOINT_URL or MCP_RUNTIME_ARN)"
                .to_string(),
        },
    };

    let roles: BTreeMap<AgentRole, bool> = AgentRole::ALL
        .iter()
        .map(|role| (*role, config.agent(*role).is_some()))
        .collect();
    let configured: Vec<&str> = roles
        .iter()
        .filter(|(_, available)| **available)
        .map(|(role, _)| role.as_str())
        .collect();
    let agent_mode = AgentModeHealth {
        available: !configured.is_empty(),
        detail: if configured.is_empty() {
            "no agent roles configured".to_string()
        } else {
            format!("configured roles: {}", configured.join(", "))
        },
        roles,
    };

    let status = match (tool_mode.available, agent_mode.available) {
        (true, true) => HealthStatus::Ok,
        (false, false) => HealthStatus::Unconfigured,
        _ => HealthStatus::Degraded,
    };

    HealthReport {
        status,
        region: config.region.clone(),
        modes: ModesHealth {
            tool_mode,
            agent_mode,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_tool_only() {
        let config = GatewayConfig::default()
            .with_tool_url(Url::parse("https://tools.example.com/mcp").unwrap());
        let report = introspect(&config);
        assert!(report.tool_mode_available());
        assert!(!report.agent_mode_available());
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.modes.tool_mode.detail.contains("tools.example.com"));
    }

    #[test]
    fn test_per_role_availability() {
        let config = GatewayConfig::default().with_agent_url(
            AgentRole::Provisioning,
            Url::parse("https://agents.example.com/prov").unwrap(),
        );
        let report = introspect(&config);
        assert!(report.agent_mode_available());
        assert!(report.role_available(AgentRole::Provisioning));
        assert!(!report.role_available(AgentRole::Onboarding));
        assert!(report.modes.agent_mode.detail.contains("provisioning"));
    }

    #[test]
    fn test_nothing_configured() {
        let report = introspect(&GatewayConfig::default());
        assert_eq!(report.status, HealthStatus::Unconfigured);
        assert_eq!(report.region, "us-east-1");
    }

    #[test]
    fn test_json_shape() {
        let config = GatewayConfig::default()
            .with_tool_url(Url::parse("https://tools.example.com/mcp").unwrap())
            .with_agent_url(
                AgentRole::Onboarding,
                Url::parse("https://agents.example.com/onb").unwrap(),
            );
        let value = serde_json::to_value(introspect(&config)).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["modes"]["toolMode"]["available"], true);
        assert_eq!(value["modes"]["agentMode"]["roles"]["onboarding"], true);
        assert_eq!(value["modes"]["agentMode"]["roles"]["provisioning"], false);
    }
}
