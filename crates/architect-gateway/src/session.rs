//! Session management — one record per (protocol, conversation id)
//!
//! Requests that share an id take turns: each holds a lease on the record
//! for the whole downstream call, and waiters are served in arrival order.
//! Records idle past the inactivity window are gone; the next request with
//! that id starts over as if the id were new.

use architect_a2a::protocol::{MIN_SESSION_ID_LEN, new_session_id};
use architect_core::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::router::Protocol;

/// Maximum session id length
const MAX_SESSION_ID_LEN: usize = 256;

/// Snapshot of a session's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub token: String,
    pub protocol: Protocol,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub request_count: u64,
}

impl SessionRecord {
    fn new(protocol: Protocol, token: &str, now: DateTime<Utc>) -> Self {
        Self {
            token: token.to_string(),
            protocol,
            created_at: now,
            last_used: now,
            request_count: 0,
        }
    }

    fn is_idle(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let idle = now.signed_duration_since(self.last_used);
        idle.to_std().is_ok_and(|idle| idle >= window)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    protocol: Protocol,
    id: String,
}

struct Slot {
    /// Held for the duration of one downstream call. FIFO-fair.
    turn: Arc<AsyncMutex<()>>,
    record: Mutex<SessionRecord>,
    /// Set once the sweep has evicted this slot; holders must look again.
    retired: AtomicBool,
}

impl Slot {
    fn new(record: SessionRecord) -> Arc<Self> {
        Arc::new(Self {
            turn: Arc::new(AsyncMutex::new(())),
            record: Mutex::new(record),
            retired: AtomicBool::new(false),
        })
    }

    fn record(&self) -> std::sync::MutexGuard<'_, SessionRecord> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exclusive turn on one session. Released on drop.
pub struct SessionLease {
    slot: Arc<Slot>,
    _turn: OwnedMutexGuard<()>,
    protocol: Protocol,
    id: String,
    is_new: bool,
    request_count: u64,
}

impl SessionLease {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// True when this request started the conversation (or restarted an expired one).
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Requests served on this session so far, this one included.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.slot.record().last_used = Utc::now();
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("protocol", &self.protocol)
            .field("id", &self.id)
            .field("is_new", &self.is_new)
            .field("request_count", &self.request_count)
            .finish()
    }
}

/// Trim and validate a client-supplied session id.
fn normalize_session_id(id: &str) -> GatewayResult<String> {
    let id = id.trim();
    if id.is_empty() {
        return Err(GatewayError::InvalidRequest("session id cannot be empty".into()));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(GatewayError::InvalidRequest(format!(
            "session id longer than {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    // Ids travel in signed headers, which carry visible ASCII only.
    if !id.chars().all(|c| c.is_ascii_graphic()) {
        return Err(GatewayError::InvalidRequest(
            "session id must be visible ASCII without spaces".into(),
        ));
    }
    Ok(id.to_string())
}

/// Tracks continuity tokens for both protocols.
pub struct SessionManager {
    slots: RwLock<HashMap<SessionKey, Arc<Slot>>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Wait for this request's turn on `(protocol, id)`.
    ///
    /// Creates the record when the id is unseen. An expired record is
    /// replaced rather than served.
    pub async fn acquire(&self, protocol: Protocol, id: &str) -> GatewayResult<SessionLease> {
        let id = normalize_session_id(id)?;
        let key = SessionKey {
            protocol,
            id: id.clone(),
        };

        loop {
            let slot = self.slot(&key).await;
            let turn = slot.turn.clone().lock_owned().await;
            if slot.retired.load(Ordering::SeqCst) {
                debug!(%protocol, session = %id, "Session was evicted while waiting, retrying");
                continue;
            }

            let now = Utc::now();
            let (is_new, request_count) = {
                let mut record = slot.record();
                if record.is_idle(now, self.idle_timeout) {
                    info!(%protocol, session = %id, "Session expired, starting over");
                    *record = SessionRecord::new(protocol, &id, now);
                }
                record.request_count += 1;
                record.last_used = now;
                (record.request_count == 1, record.request_count)
            };

            debug!(%protocol, session = %id, request_count, "Session turn acquired");
            return Ok(SessionLease {
                slot,
                _turn: turn,
                protocol,
                id,
                is_new,
                request_count,
            });
        }
    }

    /// Lease for an agent conversation, minting an id when the client has none.
    pub async fn begin_agent(&self, session_id: Option<&str>) -> GatewayResult<SessionLease> {
        let id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => {
                if id.len() < MIN_SESSION_ID_LEN {
                    return Err(GatewayError::InvalidRequest(format!(
                        "agent session id must be at least {} characters",
                        MIN_SESSION_ID_LEN
                    )));
                }
                id.to_string()
            }
            None => new_session_id(),
        };
        self.acquire(Protocol::Agent, &id).await
    }

    /// Record a token handed out by a downstream runtime. Returns it normalized.
    pub async fn register(&self, protocol: Protocol, token: &str) -> GatewayResult<String> {
        let token = normalize_session_id(token)?;
        let key = SessionKey {
            protocol,
            id: token.clone(),
        };
        let slot = self.slot(&key).await;
        slot.record().last_used = Utc::now();
        debug!(%protocol, session = %token, "Registered downstream session token");
        Ok(token)
    }

    /// Current record for `(protocol, id)`, unless missing or expired.
    pub async fn get(&self, protocol: Protocol, id: &str) -> Option<SessionRecord> {
        let key = SessionKey {
            protocol,
            id: normalize_session_id(id).ok()?,
        };
        let slots = self.slots.read().await;
        let record = slots.get(&key)?.record().clone();
        (!record.is_idle(Utc::now(), self.idle_timeout)).then_some(record)
    }

    /// Number of tracked sessions, expired ones not yet swept included.
    pub async fn count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Evict idle sessions nobody is using. Returns how many went.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|key, slot| {
            // A held or contended slot is in use regardless of its timestamps.
            let Ok(_turn) = slot.turn.try_lock() else {
                return true;
            };
            if !slot.record().is_idle(now, self.idle_timeout) {
                return true;
            }
            slot.retired.store(true, Ordering::SeqCst);
            debug!(protocol = %key.protocol, session = %key.id, "Evicting idle session");
            false
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            info!("Session sweep evicted {} idle session(s)", evicted);
        }
        evicted
    }

    /// Sweep every `every` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.sweep().await;
            }
        })
    }

    async fn slot(&self, key: &SessionKey) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().await.get(key) {
            return slot.clone();
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(protocol = %key.protocol, session = %key.id, "New session");
                Slot::new(SessionRecord::new(key.protocol, &key.id, Utc::now()))
            })
            .clone()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(architect_core::config::DEFAULT_SESSION_IDLE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_and_subsequent_requests() {
        let mgr = SessionManager::new(Duration::from_secs(60));
        let first = mgr.acquire(Protocol::Tool, "abc").await.unwrap();
        assert!(first.is_new());
        assert_eq!(first.request_count(), 1);
        drop(first);

        let second = mgr.acquire(Protocol::Tool, "  abc ").await.unwrap();
        assert!(!second.is_new());
        assert_eq!(second.request_count(), 2);
        assert_eq!(second.id(), "abc");
        assert_eq!(mgr.count().await, 1);
    }

    #[tokio::test]
    async fn test_protocols_do_not_share_records() {
        let mgr = SessionManager::new(Duration::from_secs(60));
        let _tool = mgr.acquire(Protocol::Tool, "same").await.unwrap();
        // Would deadlock if the two protocols shared a record.
        let agent = mgr.acquire(Protocol::Agent, "same").await.unwrap();
        assert!(agent.is_new());
        assert_eq!(mgr.count().await, 2);
    }

    #[tokio::test]
    async fn test_ids_are_case_sensitive() {
        let mgr = SessionManager::new(Duration::from_secs(60));
        drop(mgr.acquire(Protocol::Tool, "Token").await.unwrap());
        assert!(mgr.get(Protocol::Tool, "token").await.is_none());
        assert!(mgr.get(Protocol::Tool, "Token").await.is_some());
    }

    #[tokio::test]
    async fn test_same_id_waits_for_turn() {
        let mgr = Arc::new(SessionManager::new(Duration::from_secs(60)));
        let held = mgr.acquire(Protocol::Agent, "s").await.unwrap();

        let waiter = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.acquire(Protocol::Agent, "s").await.map(|l| l.request_count()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_waiters_served_in_arrival_order() {
        let mgr = Arc::new(SessionManager::new(Duration::from_secs(60)));
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = mgr.acquire(Protocol::Agent, "fifo").await.unwrap();

        let mut handles = Vec::new();
        for n in 0..5 {
            let mgr = mgr.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _lease = mgr.acquire(Protocol::Agent, "fifo").await.unwrap();
                order.lock().unwrap().push(n);
            }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_expired_session_behaves_as_unseen() {
        let mgr = SessionManager::new(Duration::from_millis(30));
        drop(mgr.acquire(Protocol::Tool, "old").await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(mgr.get(Protocol::Tool, "old").await.is_none());
        let again = mgr.acquire(Protocol::Tool, "old").await.unwrap();
        assert!(again.is_new());
        assert_eq!(again.request_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_evicts_idle_but_not_held() {
        let mgr = SessionManager::new(Duration::from_millis(30));
        drop(mgr.acquire(Protocol::Tool, "idle").await.unwrap());
        let busy = mgr.acquire(Protocol::Tool, "busy").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(mgr.sweep().await, 1);
        assert_eq!(mgr.count().await, 1);
        drop(busy);
    }

    #[tokio::test]
    async fn test_waiter_on_evicted_slot_retries() {
        let mgr = SessionManager::new(Duration::from_millis(10));
        let key = SessionKey {
            protocol: Protocol::Tool,
            id: "r".into(),
        };
        let stale = mgr.slot(&key).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(mgr.sweep().await, 1);
        assert!(stale.retired.load(Ordering::SeqCst));

        let lease = mgr.acquire(Protocol::Tool, "r").await.unwrap();
        assert!(lease.is_new());
        assert!(!Arc::ptr_eq(&lease.slot, &stale));
    }

    #[tokio::test]
    async fn test_begin_agent_mints_long_id() {
        let mgr = SessionManager::new(Duration::from_secs(60));
        let lease = mgr.begin_agent(None).await.unwrap();
        assert!(lease.id().starts_with("session-"));
        assert!(lease.id().len() >= MIN_SESSION_ID_LEN);
        assert_eq!(lease.protocol(), Protocol::Agent);
        drop(lease);

        let blank = mgr.begin_agent(Some("   ")).await.unwrap();
        assert!(blank.id().starts_with("session-"));
    }

    #[tokio::test]
    async fn test_begin_agent_rejects_short_id() {
        let mgr = SessionManager::new(Duration::from_secs(60));
        let err = mgr.begin_agent(Some("short")).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_register_downstream_token() {
        let mgr = SessionManager::new(Duration::from_secs(60));
        mgr.register(Protocol::Tool, "from-runtime").await.unwrap();
        let record = mgr.get(Protocol::Tool, "from-runtime").await.unwrap();
        assert_eq!(record.request_count, 0);

        let lease = mgr.acquire(Protocol::Tool, "from-runtime").await.unwrap();
        assert!(lease.is_new());
    }

    #[tokio::test]
    async fn test_spawned_sweeper_runs() {
        let mgr = Arc::new(SessionManager::new(Duration::from_millis(10)));
        drop(mgr.acquire(Protocol::Tool, "gone").await.unwrap());
        let sweeper = mgr.spawn_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mgr.count().await, 0);
        sweeper.abort();
    }

    #[test]
    fn test_normalize_session_id() {
        assert_eq!(normalize_session_id("  abc  ").unwrap(), "abc");
        assert!(normalize_session_id("").is_err());
        assert!(normalize_session_id("   ").is_err());
        assert!(normalize_session_id("a\0b").is_err());
        assert!(normalize_session_id("a\nb").is_err());
        assert!(normalize_session_id("a b").is_err());
        assert!(normalize_session_id("session-café").is_err());
        assert!(normalize_session_id(&"x".repeat(MAX_SESSION_ID_LEN)).is_ok());
        assert!(normalize_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
    }
}
