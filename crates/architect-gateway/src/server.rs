//! Gateway server — shared state, routes and the serve loop

use anyhow::{Context, Result};
use architect_a2a::A2aClient;
use architect_core::{CredentialProvider, GatewayConfig, Transport};
use architect_mcp::McpClient;
use axum::Router;
use axum::routing::{get, post};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::router::ProtocolRouter;
use crate::session::SessionManager;

/// Everything a handler needs. Built once at startup.
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub router: ProtocolRouter,
    pub sessions: Arc<SessionManager>,
    pub a2a: A2aClient,
    pub mcp: McpClient,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let router = ProtocolRouter::from_config(&config);
        let sessions = Arc::new(SessionManager::new(config.session_idle_timeout));
        let a2a = A2aClient::new(transport.clone(), credentials.clone(), config.request_timeout);
        let mcp = McpClient::new(transport, credentials, config.request_timeout);
        Self {
            config: Arc::new(config),
            router,
            sessions,
            a2a,
            mcp,
        }
    }
}

/// The axum application: API routes, health, permissive CORS and request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/mcp", post(handlers::tool))
        .route("/api/agent/{agent_type}", post(handlers::agent))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
}

/// HTTP front of the gateway.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Bind, serve until `shutdown` resolves, then stop the session sweeper.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let config = &self.state.config;
        let addr = format!("{}:{}", config.host, config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        let sweep_every = sweep_interval(config.session_idle_timeout);
        let sweeper = self.state.sessions.spawn_sweeper(sweep_every);

        info!(
            "Gateway listening on http://{} (region {}, session idle timeout {}s)",
            addr,
            config.region,
            config.session_idle_timeout.as_secs()
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("Gateway server failed");

        sweeper.abort();
        info!("Gateway stopped");
        result
    }
}

/// Sweep a few times per idle window, but not more than once a second.
fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).max(Duration::from_secs(1))
}
