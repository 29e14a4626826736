//! architect — signing gateway between the browser and the agent runtimes
//!
//! Usage:
//!   architect serve [--config gateway.toml] [--host 0.0.0.0] [--port 3001]
//!   architect health [--config gateway.toml]

use anyhow::{Context, Result};
use architect_core::{AmbientCredentials, GatewayConfig, HttpTransport, SystemEnv, introspect};
use architect_gateway::{AppState, GatewayServer};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "architect")]
#[command(version, about = "Signing gateway for MCP and A2A agent runtimes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Path to a TOML config file
        #[arg(short, long, env = "ARCHITECT_CONFIG", value_name = "FILE")]
        config: Option<PathBuf>,

        /// Bind host (overrides config and GATEWAY_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config and GATEWAY_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print which modes the current configuration enables
    Health {
        /// Path to a TOML config file
        #[arg(short, long, env = "ARCHITECT_CONFIG", value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config, host, port } => cmd_serve(config.as_deref(), host, port).await,
        Commands::Health { config } => cmd_health(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<GatewayConfig> {
    let mut config = GatewayConfig::load(path, &SystemEnv)?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    Ok(config)
}

async fn cmd_serve(path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = load_config(path, host, port)?;

    let report = introspect(&config);
    info!("architect v{} starting: {}", env!("CARGO_PKG_VERSION"), report.summary());
    if !report.tool_mode_available() && !report.agent_mode_available() {
        warn!("No tool endpoint or agent role configured, every API call will be rejected");
    }

    let credentials = Arc::new(AmbientCredentials::from_environment());
    let transport = Arc::new(HttpTransport::new().context("Failed to build HTTP transport")?);
    GatewayServer::new(AppState::new(config, credentials, transport))
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
}

fn cmd_health(path: Option<&Path>) -> Result<()> {
    let config = load_config(path, None, None)?;
    let report = introspect(&config);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["architect", "serve", "--host", "127.0.0.1", "--port", "8080"]).unwrap();
        match cli.command {
            Commands::Serve { host, port, .. } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(8080));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_health_with_config() {
        let cli = Cli::try_parse_from(["architect", "health", "--config", "gateway.toml"]).unwrap();
        match cli.command {
            Commands::Health { config } => {
                assert_eq!(config, Some(PathBuf::from("gateway.toml")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["architect", "serve", "--port", "not-a-port"]).is_err());
    }
}
