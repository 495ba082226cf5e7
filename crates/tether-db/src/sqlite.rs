use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use serde_json::{Map, Value};

use tether_core::session::{new_token, Session, SessionStore, StoreError, DEFAULT_TTL};
use tether_core::time::{Clock, SystemClock};

pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SqliteSessionStore {
    pub fn new(path: &str) -> SqlResult<Self> {
        Self::open(Connection::open(path)?, DEFAULT_TTL, Arc::new(SystemClock))
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::open(Connection::open_in_memory()?, DEFAULT_TTL, Arc::new(SystemClock))
    }

    pub fn open(conn: Connection, ttl: Duration, clock: Arc<dyn Clock>) -> SqlResult<Self> {
        Self::init_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
            clock,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn init_tables(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                principal TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS sessions_expires_at ON sessions(expires_at);
            "
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection poisoned".to_string()))
    }

    fn expiry(&self) -> u64 {
        self.clock.now_secs() + self.ttl.as_secs()
    }

    /// Drops every expired row, returning how many went.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now_secs() as i64;
        self.conn()?
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
            .map_err(unavailable)
    }
}

fn unavailable(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

impl SessionStore for SqliteSessionStore {
    fn create(&self, principal: Map<String, Value>) -> Result<Session, StoreError> {
        let session = Session {
            token: new_token(),
            principal,
            expires_at: self.expiry(),
        };
        let principal = Value::Object(session.principal.clone()).to_string();
        self.conn()?
            .execute(
                "INSERT INTO sessions (token, principal, expires_at) VALUES (?1, ?2, ?3)",
                params![session.token, principal, session.expires_at as i64],
            )
            .map_err(unavailable)?;
        Ok(session)
    }

    fn resolve(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let now = self.clock.now_secs();
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT principal, expires_at FROM sessions WHERE token = ?1",
                [token],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(unavailable)?;

        let Some((principal_json, expires_at)) = row else {
            return Ok(None);
        };
        let expires_at = expires_at.max(0) as u64;
        if expires_at <= now {
            conn.execute("DELETE FROM sessions WHERE token = ?1", [token])
                .map_err(unavailable)?;
            return Ok(None);
        }

        let principal = match serde_json::from_str::<Value>(&principal_json) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(StoreError::Corrupt {
                    token: token.to_string(),
                    reason: format!("principal is not an object: {other}"),
                });
            }
            Err(e) => {
                return Err(StoreError::Corrupt {
                    token: token.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        Ok(Some(Session {
            token: token.to_string(),
            principal,
            expires_at,
        }))
    }

    fn extend(&self, session: &mut Session) -> Result<(), StoreError> {
        let expires_at = self.expiry();
        let changed = self
            .conn()?
            .execute(
                "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
                params![expires_at as i64, session.token],
            )
            .map_err(unavailable)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        session.expires_at = expires_at;
        Ok(())
    }

    fn destroy(&self, token: &str) -> Result<(), StoreError> {
        self.conn()?
            .execute("DELETE FROM sessions WHERE token = ?1", [token])
            .map_err(unavailable)?;
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
        json!({"user": {"_id": "u-1", "name": "Ada"}}).as_object().cloned().unwrap()
    }

    #[test]
    fn sessions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let path = path.to_str().unwrap();

        let token = {
            let store = SqliteSessionStore::new(path).unwrap();
            store.create(principal()).unwrap().token
        };

        let store = SqliteSessionStore::new(path).unwrap();
        let session = store.resolve(&token).unwrap().unwrap();
        assert_eq!(session.get("user").unwrap()["name"], "Ada");
    }

    #[test]
    fn expiry_and_extend_follow_the_clock() {
        let clock = Arc::new(ManualClock(AtomicU64::new(500)));
        let store = SqliteSessionStore::open(
            Connection::open_in_memory().unwrap(),
            Duration::from_secs(30),
            clock.clone(),
        )
        .unwrap();

        let mut session = store.create(principal()).unwrap();
        assert_eq!(session.expires_at, 530);

        clock.0.store(520, Ordering::SeqCst);
        store.extend(&mut session).unwrap();
        assert_eq!(store.resolve(&session.token).unwrap().unwrap().expires_at, 550);

        clock.0.store(550, Ordering::SeqCst);
        assert!(store.resolve(&session.token).unwrap().is_none());
        assert!(matches!(store.extend(&mut session), Err(StoreError::NotFound)));
    }

    #[test]
    fn destroy_and_purge() {
        let clock = Arc::new(ManualClock(AtomicU64::new(0)));
        let store = SqliteSessionStore::open(
            Connection::open_in_memory().unwrap(),
            Duration::from_secs(10),
            clock.clone(),
        )
        .unwrap();

        let kept = store.create(principal()).unwrap();
        store.destroy(&kept.token).unwrap();
        assert!(store.resolve(&kept.token).unwrap().is_none());

        store.create(principal()).unwrap();
        store.create(principal()).unwrap();
        clock.0.store(10, Ordering::SeqCst);
        assert_eq!(store.purge_expired().unwrap(), 2);
    }
}
