//! In-memory session store.
//!
//! Keyed by `(kind, code)`; a background sweeper removes expired entries
//! once per second. Counts are O(n) scans.

use crate::error::GatewayError;
use crate::sessions::{AuthSession, LoginSession, SessionKind, SessionStore};
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// In-memory session store for single-node deployments and tests.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<(SessionKind, String), AuthSession>>,
    logins: Mutex<HashMap<Uuid, LoginSession>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry. Returns the number of evictions.
    pub fn sweep(&self, now: i64) -> usize {
        let mut evicted = 0;
        {
            let mut sessions = self.sessions.lock();
            let before = sessions.len();
            sessions.retain(|_, s| !s.is_expired(now));
            evicted += before - sessions.len();
        }
        {
            let mut logins = self.logins.lock();
            let before = logins.len();
            logins.retain(|_, l| !l.is_expired(now));
            evicted += before - logins.len();
        }
        evicted
    }

    /// Run the eviction sweeper until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep(Utc::now().timestamp());
                    if evicted > 0 {
                        tracing::debug!(evicted, "Swept expired sessions");
                    }
                }
                () = shutdown.recv() => break,
            }
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: AuthSession) -> Result<(), GatewayError> {
        let key = (session.kind, session.code.clone());
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&key) {
            return Err(GatewayError::store(format!(
                "Duplicate session code for kind {}",
                session.kind.as_str()
            )));
        }
        sessions.insert(key, session);
        Ok(())
    }

    async fn get(&self, kind: SessionKind, code: &str) -> Result<Option<AuthSession>, GatewayError> {
        let now = Utc::now().timestamp();
        let key = (kind, code.to_string());
        let mut sessions = self.sessions.lock();

        if kind.consume_on_read() {
            match sessions.remove(&key) {
                Some(s) if !s.is_expired(now) => Ok(Some(s)),
                _ => Ok(None),
            }
        } else {
            match sessions.get(&key) {
                Some(s) if !s.is_expired(now) => Ok(Some(s.clone())),
                Some(_) => {
                    sessions.remove(&key);
                    Ok(None)
                }
                None => Ok(None),
            }
        }
    }

    async fn delete(&self, kind: SessionKind, code: &str) -> Result<(), GatewayError> {
        self.sessions.lock().remove(&(kind, code.to_string()));
        Ok(())
    }

    async fn count(&self, kind: Option<SessionKind>) -> Result<usize, GatewayError> {
        let now = Utc::now().timestamp();
        let sessions = self.sessions.lock();
        Ok(sessions
            .values()
            .filter(|s| !s.is_expired(now))
            .filter(|s| kind.map_or(true, |k| s.kind == k))
            .count())
    }

    async fn count_for_tenant(
        &self,
        tenant: &str,
        kind: Option<SessionKind>,
    ) -> Result<usize, GatewayError> {
        let now = Utc::now().timestamp();
        let sessions = self.sessions.lock();
        Ok(sessions
            .values()
            .filter(|s| !s.is_expired(now))
            .filter(|s| s.tenant_name == tenant)
            .filter(|s| kind.map_or(true, |k| s.kind == k))
            .count())
    }

    async fn wipe(&self, tenant: &str, subject: &str) -> Result<(), GatewayError> {
        self.sessions
            .lock()
            .retain(|_, s| !(s.tenant_name == tenant && s.subject == subject));
        Ok(())
    }

    async fn put_login(&self, login: LoginSession) -> Result<(), GatewayError> {
        self.logins.lock().insert(login.login_id, login);
        Ok(())
    }

    async fn consume_login(&self, login_id: Uuid) -> Result<bool, GatewayError> {
        let now = Utc::now().timestamp();
        match self.logins.lock().remove(&login_id) {
            Some(login) => Ok(!login.is_expired(now)),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::test_support::session;

    #[tokio::test]
    async fn test_put_and_consume_once() {
        let store = MemorySessionStore::new();
        store
            .put(session(SessionKind::Code, "acme", "sub", "abc"))
            .await
            .unwrap();

        let first = store.get(SessionKind::Code, "abc").await.unwrap();
        assert!(first.is_some());

        let second = store.get(SessionKind::Code, "abc").await.unwrap();
        assert!(second.is_none(), "code must be consume-once");
    }

    #[tokio::test]
    async fn test_duplicate_put_fails() {
        let store = MemorySessionStore::new();
        store
            .put(session(SessionKind::Code, "acme", "sub", "abc"))
            .await
            .unwrap();
        let result = store.put(session(SessionKind::Code, "acme", "sub", "abc")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_same_code_different_kind_is_distinct() {
        let store = MemorySessionStore::new();
        store
            .put(session(SessionKind::Code, "acme", "sub", "abc"))
            .await
            .unwrap();
        store
            .put(session(SessionKind::Refresh, "acme", "sub", "abc"))
            .await
            .unwrap();
        assert_eq!(store.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_not_returned() {
        let store = MemorySessionStore::new();
        let mut s = session(SessionKind::Device, "acme", "sub", "dev");
        s.generated -= 120;
        store.put(s).await.unwrap();

        assert!(store.get(SessionKind::Device, "dev").await.unwrap().is_none());
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let store = MemorySessionStore::new();
        let mut s = session(SessionKind::Code, "acme", "sub", "old");
        s.generated -= 120;
        store.put(s).await.unwrap();
        store
            .put(session(SessionKind::Code, "acme", "sub", "fresh"))
            .await
            .unwrap();

        let evicted = store.sweep(Utc::now().timestamp());
        assert_eq!(evicted, 1);
        assert_eq!(store.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_counts_by_tenant_and_kind() {
        let store = MemorySessionStore::new();
        store
            .put(session(SessionKind::Code, "acme", "a", "1"))
            .await
            .unwrap();
        store
            .put(session(SessionKind::Refresh, "acme", "a", "2"))
            .await
            .unwrap();
        store
            .put(session(SessionKind::Code, "bv", "b", "3"))
            .await
            .unwrap();

        assert_eq!(store.count(None).await.unwrap(), 3);
        assert_eq!(store.count(Some(SessionKind::Code)).await.unwrap(), 2);
        assert_eq!(store.count_for_tenant("acme", None).await.unwrap(), 2);
        assert_eq!(
            store
                .count_for_tenant("acme", Some(SessionKind::Refresh))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_wipe_by_tenant_and_subject() {
        let store = MemorySessionStore::new();
        store
            .put(session(SessionKind::Code, "acme", "alice", "1"))
            .await
            .unwrap();
        store
            .put(session(SessionKind::Refresh, "acme", "alice", "2"))
            .await
            .unwrap();
        store
            .put(session(SessionKind::Code, "acme", "bob", "3"))
            .await
            .unwrap();

        store.wipe("acme", "alice").await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert!(store.get(SessionKind::Code, "3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_ticket_consume_once() {
        let store = MemorySessionStore::new();
        let login = LoginSession::new();
        let id = login.login_id;
        store.put_login(login).await.unwrap();

        assert!(store.consume_login(id).await.unwrap());
        assert!(!store.consume_login(id).await.unwrap());
        assert!(!store.consume_login(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_login_ticket_rejected() {
        let store = MemorySessionStore::new();
        let mut login = LoginSession::new();
        login.generated -= 300;
        let id = login.login_id;
        store.put_login(login).await.unwrap();

        assert!(!store.consume_login(id).await.unwrap());
    }
}
