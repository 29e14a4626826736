//! Gateway configuration — built once at startup, immutable afterwards
//!
//! Values come from an optional TOML file overlaid by environment variables
//! (environment wins). Environment access goes through [`ReadEnv`] so tests
//! never depend on the process environment.

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::GatewayError;
use crate::signing::uri_encode;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SIGNING_SERVICE: &str = "bedrock-agentcore";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Read access to environment variables.
pub trait ReadEnv {
    /// Value of `key`, or `None` when unset or blank.
    fn var(&self, key: &str) -> Option<String>;
}

/// Delegates to `std::env`.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// In-memory environment for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl ReadEnv for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).filter(|v| !v.trim().is_empty()).cloned()
    }
}

/// Logical agent roles the gateway can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Onboarding,
    Provisioning,
}

impl AgentRole {
    pub const ALL: [AgentRole; 2] = [AgentRole::Onboarding, AgentRole::Provisioning];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Provisioning => "provisioning",
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            Self::Onboarding => "ONBOARDING",
            Self::Provisioning => "PROVISIONING",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onboarding" => Ok(Self::Onboarding),
            "provisioning" => Ok(Self::Provisioning),
            other => Err(GatewayError::Configuration(format!(
                "unknown agent role '{}' (expected one of: onboarding, provisioning)",
                other
            ))),
        }
    }
}

/// A downstream invocation target plus the identity requests to it are signed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: Url,
    pub service: String,
    pub region: String,
}

impl Endpoint {
    pub fn new(url: Url, service: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            url,
            service: service.into(),
            region: region.into(),
        }
    }

    /// Host (and port, when non-default) without scheme or path.
    pub fn host(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }
    }
}

/// A configured agent role and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub role: AgentRole,
    pub endpoint: Endpoint,
}

/// Immutable gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub region: String,
    pub signing_service: String,
    pub tool: Option<Endpoint>,
    pub agents: BTreeMap<AgentRole, AgentDescriptor>,
    pub session_idle_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            region: DEFAULT_REGION.to_string(),
            signing_service: DEFAULT_SIGNING_SERVICE.to_string(),
            tool: None,
            agents: BTreeMap::new(),
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ── File format ──

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub aws: AwsSection,
    pub tool: EndpointSection,
    pub agents: BTreeMap<String, EndpointSection>,
    pub session: SessionSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AwsSection {
    pub region: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EndpointSection {
    pub url: Option<String>,
    pub arn: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub idle_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl EndpointSection {
    fn is_set(&self) -> bool {
        self.url.is_some() || self.arn.is_some()
    }
}

impl GatewayConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>, env: &impl ReadEnv) -> Result<Self> {
        let file = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                let parsed: FileConfig = toml::from_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", p.display()))?;
                info!("Loaded gateway config from {}", p.display());
                parsed
            }
            None => FileConfig::default(),
        };
        Self::from_sources(file, env)
    }

    /// Build purely from the environment.
    pub fn from_env(env: &impl ReadEnv) -> Result<Self> {
        Self::from_sources(FileConfig::default(), env)
    }

    /// Merge a parsed file with environment overrides.
    pub fn from_sources(file: FileConfig, env: &impl ReadEnv) -> Result<Self> {
        let region = env
            .var("AWS_REGION")
            .or_else(|| env.var("REGION"))
            .or(file.aws.region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let signing_service = env
            .var("SIGNING_SERVICE")
            .or(file.aws.service)
            .unwrap_or_else(|| DEFAULT_SIGNING_SERVICE.to_string());

        let host = env
            .var("GATEWAY_HOST")
            .or(file.server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match env.var("GATEWAY_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("GATEWAY_PORT is not a valid port: {}", raw))?,
            None => file.server.port.unwrap_or(DEFAULT_PORT),
        };

        let session_idle_timeout = secs_setting(
            env,
            "SESSION_IDLE_TIMEOUT_SECS",
            file.session.idle_timeout_secs,
            DEFAULT_SESSION_IDLE_TIMEOUT,
        )?;
        let request_timeout = secs_setting(
            env,
            "REQUEST_TIMEOUT_SECS",
            file.session.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT,
        )?;

        let tool_source = env_endpoint(env, "MCP_ENDPOINT_URL", "MCP_RUNTIME_ARN").unwrap_or(file.tool);
        let tool = resolve_endpoint(&tool_source, &region, &signing_service)
            .context("Invalid tool endpoint")?;

        let mut file_agents = BTreeMap::new();
        for (name, section) in file.agents {
            let role = AgentRole::from_str(&name).map_err(|e| anyhow!("[agents.{}]: {}", name, e))?;
            file_agents.insert(role, section);
        }

        let mut agents = BTreeMap::new();
        for role in AgentRole::ALL {
            let prefix = role.env_prefix();
            let source = env_endpoint(
                env,
                &format!("{}_AGENT_URL", prefix),
                &format!("{}_AGENT_ARN", prefix),
            )
            .or_else(|| file_agents.remove(&role))
            .unwrap_or_default();

            if let Some(endpoint) = resolve_endpoint(&source, &region, &signing_service)
                .with_context(|| format!("Invalid {} agent endpoint", role))?
            {
                debug!("Agent role {} -> {}", role, endpoint.url);
                agents.insert(role, AgentDescriptor { role, endpoint });
            }
        }

        Ok(Self {
            host,
            port,
            region,
            signing_service,
            tool,
            agents,
            session_idle_timeout,
            request_timeout,
        })
    }

    /// Descriptor for a configured role.
    pub fn agent(&self, role: AgentRole) -> Option<&AgentDescriptor> {
        self.agents.get(&role)
    }

    /// Point the tool protocol at `url`, signed with this config's service and region.
    pub fn with_tool_url(mut self, url: Url) -> Self {
        self.tool = Some(Endpoint::new(url, &self.signing_service, &self.region));
        self
    }

    /// Point an agent role at `url`, signed with this config's service and region.
    pub fn with_agent_url(mut self, role: AgentRole, url: Url) -> Self {
        let endpoint = Endpoint::new(url, &self.signing_service, &self.region);
        self.agents.insert(role, AgentDescriptor { role, endpoint });
        self
    }

    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn secs_setting(
    env: &impl ReadEnv,
    key: &str,
    from_file: Option<u64>,
    default: Duration,
) -> Result<Duration> {
    let secs = match env.var(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a whole number of seconds, got '{}'", key, raw))?,
        None => match from_file {
            Some(secs) => secs,
            None => return Ok(default),
        },
    };
    if secs == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_secs(secs))
}

fn env_endpoint(env: &impl ReadEnv, url_key: &str, arn_key: &str) -> Option<EndpointSection> {
    let section = EndpointSection {
        url: env.var(url_key),
        arn: env.var(arn_key),
    };
    section.is_set().then_some(section)
}

fn resolve_endpoint(
    section: &EndpointSection,
    region: &str,
    service: &str,
) -> Result<Option<Endpoint>> {
    if let Some(raw) = section.url.as_deref() {
        let url = Url::parse(raw.trim()).with_context(|| format!("not a valid URL: {}", raw))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            bail!("endpoint URL must be http(s) with a host: {}", raw);
        }
        return Ok(Some(Endpoint::new(url, service, region)));
    }
    if let Some(arn) = section.arn.as_deref() {
        let arn_region = arn_region(arn).unwrap_or(region);
        let url = agent_runtime_url(arn, arn_region)?;
        return Ok(Some(Endpoint::new(url, service, arn_region)));
    }
    Ok(None)
}

/// Region component of an ARN (`arn:partition:service:region:account:resource`).
pub fn arn_region(arn: &str) -> Option<&str> {
    let mut parts = arn.trim().splitn(6, ':');
    if parts.next() != Some("arn") {
        return None;
    }
    parts.nth(2).filter(|r| !r.is_empty())
}

/// Invocation URL of an agent runtime identified by ARN.
pub fn agent_runtime_url(arn: &str, region: &str) -> Result<Url> {
    let arn = arn.trim();
    if !arn.starts_with("arn:") || arn.split(':').count() < 6 {
        bail!("not a valid runtime ARN: {}", arn);
    }
    let raw = format!(
        "https://bedrock-agentcore.{}.amazonaws.com/runtimes/{}/invocations?qualifier=DEFAULT",
        region,
        uri_encode(arn, true)
    );
    Url::parse(&raw).with_context(|| format!("could not build runtime URL for {}", arn))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONBOARDING_ARN: &str =
        "arn:aws:bedrock-agentcore:us-west-2:123456789012:runtime/onboarding_agent-AbCdEf1234";

    #[test]
    fn test_defaults_with_empty_env() {
        let cfg = GatewayConfig::from_env(&MapEnv::new()).unwrap();
        assert_eq!(cfg.region, DEFAULT_REGION);
        assert_eq!(cfg.signing_service, DEFAULT_SIGNING_SERVICE);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.tool.is_none());
        assert!(cfg.agents.is_empty());
        assert_eq!(cfg.session_idle_timeout, DEFAULT_SESSION_IDLE_TIMEOUT);
        assert_eq!(cfg.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_env_urls() {
        let env = MapEnv::new()
            .with("AWS_REGION", "eu-west-1")
            .with("MCP_ENDPOINT_URL", "https://mcp.example.com/mcp")
            .with("ONBOARDING_AGENT_URL", "http://localhost:9000/");
        let cfg = GatewayConfig::from_env(&env).unwrap();
        let tool = cfg.tool.as_ref().unwrap();
        assert_eq!(tool.url.as_str(), "https://mcp.example.com/mcp");
        assert_eq!(tool.region, "eu-west-1");
        assert_eq!(tool.host(), "mcp.example.com");

        let onboarding = cfg.agent(AgentRole::Onboarding).unwrap();
        assert_eq!(onboarding.endpoint.host(), "localhost:9000");
        assert!(cfg.agent(AgentRole::Provisioning).is_none());
    }

    #[test]
    fn test_region_fallback_variable() {
        let env = MapEnv::new().with("REGION", "ap-southeast-2");
        let cfg = GatewayConfig::from_env(&env).unwrap();
        assert_eq!(cfg.region, "ap-southeast-2");
    }

    #[test]
    fn test_arn_derives_runtime_url_and_region() {
        let env = MapEnv::new().with("ONBOARDING_AGENT_ARN", ONBOARDING_ARN);
        let cfg = GatewayConfig::from_env(&env).unwrap();
        let endpoint = &cfg.agent(AgentRole::Onboarding).unwrap().endpoint;
        assert_eq!(endpoint.region, "us-west-2");
        assert_eq!(endpoint.host(), "bedrock-agentcore.us-west-2.amazonaws.com");
        assert_eq!(
            endpoint.url.path(),
            "/runtimes/arn%3Aaws%3Abedrock-agentcore%3Aus-west-2%3A123456789012%3Aruntime%2Fonboarding_agent-AbCdEf1234/invocations"
        );
        assert_eq!(endpoint.url.query(), Some("qualifier=DEFAULT"));
    }

    #[test]
    fn test_url_wins_over_arn() {
        let env = MapEnv::new()
            .with("PROVISIONING_AGENT_URL", "http://127.0.0.1:9100")
            .with("PROVISIONING_AGENT_ARN", ONBOARDING_ARN);
        let cfg = GatewayConfig::from_env(&env).unwrap();
        assert_eq!(
            cfg.agent(AgentRole::Provisioning).unwrap().endpoint.host(),
            "127.0.0.1:9100"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let env = MapEnv::new().with("MCP_ENDPOINT_URL", "not a url");
        assert!(GatewayConfig::from_env(&env).is_err());

        let env = MapEnv::new().with("MCP_ENDPOINT_URL", "ftp://example.com/mcp");
        assert!(GatewayConfig::from_env(&env).is_err());
    }

    #[test]
    fn test_invalid_timeouts_rejected() {
        let env = MapEnv::new().with("REQUEST_TIMEOUT_SECS", "soon");
        assert!(GatewayConfig::from_env(&env).is_err());

        let env = MapEnv::new().with("SESSION_IDLE_TIMEOUT_SECS", "0");
        assert!(GatewayConfig::from_env(&env).is_err());
    }

    #[test]
    fn test_file_overlaid_by_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 8080

[aws]
region = "us-east-2"

[tool]
url = "https://tools.internal/mcp"

[agents.provisioning]
url = "https://provisioning.internal/"

[session]
idle_timeout_secs = 60
request_timeout_secs = 10
"#,
        )
        .unwrap();

        let env = MapEnv::new().with("GATEWAY_PORT", "9090");
        let cfg = GatewayConfig::load(Some(&path), &env).unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.region, "us-east-2");
        assert_eq!(cfg.tool.as_ref().unwrap().host(), "tools.internal");
        assert!(cfg.agent(AgentRole::Provisioning).is_some());
        assert_eq!(cfg.session_idle_timeout, Duration::from_secs(60));
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_file_unknown_role_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[agents.billing]\nurl = \"https://x.example\"\n").unwrap();
        let err = GatewayConfig::load(Some(&path), &MapEnv::new()).unwrap_err();
        assert!(format!("{:#}", err).contains("billing"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = GatewayConfig::load(Some(Path::new("/nonexistent/gateway.toml")), &MapEnv::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_agent_role_parsing() {
        assert_eq!("onboarding".parse::<AgentRole>().unwrap(), AgentRole::Onboarding);
        assert_eq!(" Provisioning ".parse::<AgentRole>().unwrap(), AgentRole::Provisioning);
        let err = "billing".parse::<AgentRole>().unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
        assert_eq!(AgentRole::Onboarding.to_string(), "onboarding");
    }

    #[test]
    fn test_arn_region() {
        assert_eq!(arn_region(ONBOARDING_ARN), Some("us-west-2"));
        assert_eq!(arn_region("arn:aws:iam::123456789012:role/x"), None);
        assert_eq!(arn_region("https://example.com"), None);
        assert!(agent_runtime_url("not-an-arn", "us-east-1").is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let cfg = GatewayConfig::default()
            .with_tool_url(Url::parse("http://127.0.0.1:7000/mcp").unwrap())
            .with_agent_url(AgentRole::Onboarding, Url::parse("http://127.0.0.1:7001").unwrap())
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(cfg.tool.as_ref().unwrap().service, DEFAULT_SIGNING_SERVICE);
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
    }
}
