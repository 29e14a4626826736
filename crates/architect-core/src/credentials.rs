//! Credential resolution — ambient signing identities with cached refresh
//!
//! [`CredentialProvider`] is the single capability the rest of the gateway
//! depends on. [`AmbientCredentials`] walks a chain of [`CredentialSource`]s
//! (environment, then the shared credentials file) and caches the result
//! until it is close to expiry. [`StaticCredentials`] is a fixed identity.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{ReadEnv, SystemEnv};
use crate::error::{GatewayError, GatewayResult};

/// Identities expiring within this many minutes are refreshed before use.
pub const DEFAULT_REFRESH_WINDOW_MINUTES: i64 = 5;

/// Access credentials used to compute request signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningIdentity {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl SigningIdentity {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True when the identity has expired or will within `window` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at.is_some_and(|at| at <= now + window)
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Resolves the identity outbound calls are signed with.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self) -> GatewayResult<Arc<SigningIdentity>>;
}

/// One place an identity may be found.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when this source has nothing to offer.
    async fn load(&self) -> GatewayResult<Option<SigningIdentity>>;
}

/// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`,
/// with an optional RFC 3339 `AWS_CREDENTIAL_EXPIRATION`.
pub struct EnvCredentialSource<E> {
    env: E,
}

impl<E: ReadEnv + Send + Sync> EnvCredentialSource<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

#[async_trait]
impl<E: ReadEnv + Send + Sync> CredentialSource for EnvCredentialSource<E> {
    fn name(&self) -> &str {
        "env"
    }

    async fn load(&self) -> GatewayResult<Option<SigningIdentity>> {
        let (Some(key_id), Some(secret)) = (
            self.env.var("AWS_ACCESS_KEY_ID"),
            self.env.var("AWS_SECRET_ACCESS_KEY"),
        ) else {
            return Ok(None);
        };

        let mut identity = SigningIdentity::new(key_id.trim(), secret.trim());
        if let Some(token) = self.env.var("AWS_SESSION_TOKEN") {
            identity = identity.with_session_token(token.trim());
        }
        if let Some(raw) = self.env.var("AWS_CREDENTIAL_EXPIRATION") {
            let expires_at = DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| {
                GatewayError::Credential(format!(
                    "AWS_CREDENTIAL_EXPIRATION is not RFC 3339 ({}): {}",
                    raw, e
                ))
            })?;
            identity = identity.with_expiry(expires_at.with_timezone(&Utc));
        }
        Ok(Some(identity))
    }
}

/// Shared credentials file (`~/.aws/credentials` INI format).
pub struct ProfileCredentialSource {
    path: PathBuf,
    profile: String,
}

impl ProfileCredentialSource {
    pub fn new(path: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            profile: profile.into(),
        }
    }

    /// Honour `AWS_SHARED_CREDENTIALS_FILE` and `AWS_PROFILE`.
    pub fn from_env(env: &impl ReadEnv) -> Option<Self> {
        let path = match env.var("AWS_SHARED_CREDENTIALS_FILE") {
            Some(p) => PathBuf::from(p),
            None => dirs::home_dir()?.join(".aws").join("credentials"),
        };
        let profile = env.var("AWS_PROFILE").unwrap_or_else(|| "default".to_string());
        Some(Self::new(path, profile))
    }
}

#[async_trait]
impl CredentialSource for ProfileCredentialSource {
    fn name(&self) -> &str {
        "profile"
    }

    async fn load(&self) -> GatewayResult<Option<SigningIdentity>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GatewayError::Credential(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        Ok(parse_profile(&content, &self.profile))
    }
}

fn parse_profile(content: &str, profile: &str) -> Option<SigningIdentity> {
    let mut in_profile = false;
    let mut key_id = None;
    let mut secret = None;
    let mut token = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let section = section.trim();
            let section = section.strip_prefix("profile ").unwrap_or(section).trim();
            in_profile = section == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().to_string();
            match key.trim() {
                "aws_access_key_id" => key_id = Some(value),
                "aws_secret_access_key" => secret = Some(value),
                "aws_session_token" => token = Some(value),
                _ => {}
            }
        }
    }

    let mut identity = SigningIdentity::new(key_id?, secret?);
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        identity = identity.with_session_token(token);
    }
    Some(identity)
}

/// Tries sources in order and takes the first identity found.
pub struct ChainCredentialSource {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl ChainCredentialSource {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl CredentialSource for ChainCredentialSource {
    fn name(&self) -> &str {
        "chain"
    }

    async fn load(&self) -> GatewayResult<Option<SigningIdentity>> {
        for source in &self.sources {
            match source.load().await {
                Ok(Some(identity)) => {
                    debug!(
                        source = source.name(),
                        access_key_id = %identity.access_key_id(),
                        "Resolved signing identity"
                    );
                    return Ok(Some(identity));
                }
                Ok(None) => continue,
                Err(e) => warn!(source = source.name(), "Credential source failed: {}", e),
            }
        }
        Ok(None)
    }
}

/// Caching provider over a [`CredentialSource`].
///
/// The cache is read-mostly. Concurrent callers that all find an expiring
/// identity each reload it; the last write wins and every result is valid.
pub struct AmbientCredentials {
    source: Box<dyn CredentialSource>,
    cached: RwLock<Option<Arc<SigningIdentity>>>,
    refresh_window: Duration,
}

impl AmbientCredentials {
    pub fn new(source: impl CredentialSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cached: RwLock::new(None),
            refresh_window: Duration::minutes(DEFAULT_REFRESH_WINDOW_MINUTES),
        }
    }

    /// Environment first, then the shared credentials file.
    pub fn from_environment() -> Self {
        let mut sources: Vec<Box<dyn CredentialSource>> =
            vec![Box::new(EnvCredentialSource::new(SystemEnv))];
        if let Some(profile) = ProfileCredentialSource::from_env(&SystemEnv) {
            sources.push(Box::new(profile));
        }
        Self::new(ChainCredentialSource::new(sources))
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    /// Resolve as of `now`.
    pub async fn resolve_at(&self, now: DateTime<Utc>) -> GatewayResult<Arc<SigningIdentity>> {
        {
            let cached = self.cached.read().await;
            if let Some(identity) = cached.as_ref()
                && !identity.expires_within(now, self.refresh_window)
            {
                return Ok(identity.clone());
            }
        }

        let fresh = self.source.load().await?.ok_or_else(|| {
            GatewayError::Credential(
                "no signing identity found in the environment or shared credentials file"
                    .to_string(),
            )
        })?;

        if fresh.expires_within(now, Duration::zero()) {
            return Err(GatewayError::Credential(format!(
                "resolved identity {} is already expired",
                fresh.access_key_id()
            )));
        }
        if fresh.expires_within(now, self.refresh_window) {
            warn!(
                access_key_id = %fresh.access_key_id(),
                "Signing identity expires within the refresh window"
            );
        }

        let fresh = Arc::new(fresh);
        *self.cached.write().await = Some(fresh.clone());
        info!(
            source = self.source.name(),
            access_key_id = %fresh.access_key_id(),
            expires_at = ?fresh.expires_at(),
            "Signing identity refreshed"
        );
        Ok(fresh)
    }
}

#[async_trait]
impl CredentialProvider for AmbientCredentials {
    async fn resolve(&self) -> GatewayResult<Arc<SigningIdentity>> {
        self.resolve_at(Utc::now()).await
    }
}

/// A fixed identity (or a fixed absence of one).
pub struct StaticCredentials {
    identity: Option<Arc<SigningIdentity>>,
    resolves: AtomicUsize,
}

impl StaticCredentials {
    pub fn new(identity: SigningIdentity) -> Self {
        Self {
            identity: Some(Arc::new(identity)),
            resolves: AtomicUsize::new(0),
        }
    }

    /// A provider that always fails with a credential error.
    pub fn missing() -> Self {
        Self {
            identity: None,
            resolves: AtomicUsize::new(0),
        }
    }

    /// How many times `resolve` was called.
    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn resolve(&self) -> GatewayResult<Arc<SigningIdentity>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.identity
            .clone()
            .ok_or_else(|| GatewayError::Credential("no static signing identity configured".into()))
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    fn name(&self) -> &str {
        "static"
    }

    async fn load(&self) -> GatewayResult<Option<SigningIdentity>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(self.identity.as_deref().cloned())
    }
}
