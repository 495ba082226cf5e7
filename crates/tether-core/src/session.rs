use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::time::{Clock, SystemClock};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    /// Whatever the issuing service stored about the caller.
    pub principal: Map<String, Value>,
    /// Unix seconds.
    pub expires_at: u64,
}

impl Session {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.principal.get(key)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,

    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt session {token}: {reason}")]
    Corrupt { token: String, reason: String },
}

/// Token-keyed session storage with a renewable time-to-live.
///
/// Calls may block; the dispatcher makes them from the blocking pool.
pub trait SessionStore: Send + Sync {
    fn create(&self, principal: Map<String, Value>) -> Result<Session, StoreError>;
    /// `Ok(None)` for unknown or expired tokens.
    fn resolve(&self, token: &str) -> Result<Option<Session>, StoreError>;
    /// Pushes the expiry out by the store's TTL, in storage and on `session`.
    fn extend(&self, session: &mut Session) -> Result<(), StoreError>;
    fn destroy(&self, token: &str) -> Result<(), StoreError>;
}

/// Process-local store for tests and single-node deployments.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn expiry(&self) -> u64 {
        self.clock.now_secs() + self.ttl.as_secs()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Session>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session map poisoned".to_string()))
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, principal: Map<String, Value>) -> Result<Session, StoreError> {
        let session = Session {
            token: new_token(),
            principal,
            expires_at: self.expiry(),
        };
        self.lock()?.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    fn resolve(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let now = self.clock.now_secs();
        let mut sessions = self.lock()?;
        match sessions.get(token) {
            Some(session) if session.is_expired(now) => {
                sessions.remove(token);
                Ok(None)
            }
            Some(session) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    fn extend(&self, session: &mut Session) -> Result<(), StoreError> {
        let expires_at = self.expiry();
        let mut sessions = self.lock()?;
        let stored = sessions.get_mut(&session.token).ok_or(StoreError::NotFound)?;
        stored.expires_at = expires_at;
        session.expires_at = expires_at;
        Ok(())
    }

    fn destroy(&self, token: &str) -> Result<(), StoreError> {
        self.lock()?.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock(AtomicU64);

    impl Clock for ManualClock {
        fn now_secs(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn principal() -> Map<String, Value> {
        json!({"user": {"_id": "u-1"}}).as_object().cloned().unwrap()
    }

    #[test]
    fn resolve_returns_created_session() {
        let store = MemorySessionStore::default();
        let session = store.create(principal()).unwrap();
        let found = store.resolve(&session.token).unwrap().unwrap();
        assert_eq!(found, session);
        assert_eq!(found.get("user"), Some(&json!({"_id": "u-1"})));
        assert!(store.resolve("nope").unwrap().is_none());
    }

    #[test]
    fn expired_sessions_resolve_to_none_and_extend_renews() {
        let clock = Arc::new(ManualClock(AtomicU64::new(1_000)));
        let store = MemorySessionStore::with_clock(Duration::from_secs(60), clock.clone());
        let mut session = store.create(principal()).unwrap();
        assert_eq!(session.expires_at, 1_060);

        clock.0.store(1_050, Ordering::SeqCst);
        store.extend(&mut session).unwrap();
        assert_eq!(session.expires_at, 1_110);

        clock.0.store(1_100, Ordering::SeqCst);
        assert!(store.resolve(&session.token).unwrap().is_some());

        clock.0.store(1_110, Ordering::SeqCst);
        assert!(store.resolve(&session.token).unwrap().is_none());
        assert!(matches!(store.extend(&mut session), Err(StoreError::NotFound)));
    }

    #[test]
    fn destroy_removes_session() {
        let store = MemorySessionStore::default();
        let session = store.create(Map::new()).unwrap();
        store.destroy(&session.token).unwrap();
        assert!(store.resolve(&session.token).unwrap().is_none());
    }
}
