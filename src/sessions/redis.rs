//! Redis-backed session store.
//!
//! Entries live under `auth:{type}:{code}` with native key expiry; login
//! tickets under `loginid:{uuid}`. Count and wipe scan by prefix and filter
//! in-process; entries that fail to decode are skipped, never surfaced.

use crate::error::GatewayError;
use crate::sessions::{AuthSession, LoginSession, SessionKind, SessionStore, LOGIN_SESSION_TTL};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Redis session store for replicated deployments.
pub struct RedisSessionStore {
    conn: Arc<RwLock<ConnectionManager>>,
}

fn session_key(kind: SessionKind, code: &str) -> String {
    format!("auth:{}:{}", kind.as_str(), code)
}

fn login_key(login_id: Uuid) -> String {
    format!("loginid:{login_id}")
}

impl RedisSessionStore {
    /// Connect to Redis.
    ///
    /// The connection manager starts even when the server is unreachable;
    /// operations fail fast until it recovers.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL cannot be parsed.
    pub async fn new(redis_url: &str) -> Result<Self, GatewayError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| GatewayError::store(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::store(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(RwLock::new(conn)),
        })
    }

    /// Wrap an existing connection manager (used by tests).
    #[must_use]
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self {
            conn: Arc::new(RwLock::new(conn)),
        }
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, GatewayError> {
        let mut conn = self.conn.read().await.clone();
        let mut iter = conn
            .scan_match::<_, String>(pattern)
            .await
            .map_err(|e| GatewayError::store(e.to_string()))?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn decode_all(&self, keys: &[String]) -> Result<Vec<AuthSession>, GatewayError> {
        let mut conn = self.conn.write().await;
        let mut sessions = Vec::new();
        for key in keys {
            let value: Option<String> = conn
                .get(key)
                .await
                .map_err(|e| GatewayError::store(e.to_string()))?;
            let Some(value) = value else { continue };
            // Foreign records under the auth prefix are skipped, not errors.
            if let Ok(session) = serde_json::from_str::<AuthSession>(&value) {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, session: AuthSession) -> Result<(), GatewayError> {
        let key = session_key(session.kind, &session.code);
        let value = serde_json::to_string(&session)
            .map_err(|e| GatewayError::internal(e.to_string()))?;

        let mut conn = self.conn.write().await;
        let stored: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&value)
            .arg("NX")
            .arg("EX")
            .arg(session.ttl)
            .query_async(&mut *conn)
            .await
            .map_err(|e| GatewayError::store(e.to_string()))?;

        if stored.is_none() {
            return Err(GatewayError::store(format!(
                "Duplicate session code for kind {}",
                session.kind.as_str()
            )));
        }
        Ok(())
    }

    async fn get(&self, kind: SessionKind, code: &str) -> Result<Option<AuthSession>, GatewayError> {
        let key = session_key(kind, code);
        let mut conn = self.conn.write().await;

        let value: Option<String> = if kind.consume_on_read() {
            conn.get_del(&key)
                .await
                .map_err(|e| GatewayError::store(e.to_string()))?
        } else {
            conn.get(&key)
                .await
                .map_err(|e| GatewayError::store(e.to_string()))?
        };

        let Some(value) = value else {
            return Ok(None);
        };
        let session: AuthSession = serde_json::from_str(&value)
            .map_err(|e| GatewayError::store(format!("Undecodable session: {e}")))?;

        // Redis expiry is authoritative but the record carries its own clock.
        if session.is_expired(Utc::now().timestamp()) {
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn delete(&self, kind: SessionKind, code: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.write().await;
        conn.del::<_, ()>(session_key(kind, code))
            .await
            .map_err(|e| GatewayError::store(e.to_string()))
    }

    async fn count(&self, kind: Option<SessionKind>) -> Result<usize, GatewayError> {
        let pattern = match kind {
            Some(kind) => format!("auth:{}:*", kind.as_str()),
            None => "auth:*".to_string(),
        };
        Ok(self.scan_keys(&pattern).await?.len())
    }

    async fn count_for_tenant(
        &self,
        tenant: &str,
        kind: Option<SessionKind>,
    ) -> Result<usize, GatewayError> {
        let pattern = match kind {
            Some(kind) => format!("auth:{}:*", kind.as_str()),
            None => "auth:*".to_string(),
        };
        let keys = self.scan_keys(&pattern).await?;
        let sessions = self.decode_all(&keys).await?;
        Ok(sessions.iter().filter(|s| s.tenant_name == tenant).count())
    }

    async fn wipe(&self, tenant: &str, subject: &str) -> Result<(), GatewayError> {
        let keys = self.scan_keys("auth:*").await?;
        let mut conn = self.conn.write().await;
        for key in keys {
            let value: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| GatewayError::store(e.to_string()))?;
            let Some(value) = value else { continue };
            let Ok(session) = serde_json::from_str::<AuthSession>(&value) else {
                continue;
            };
            if session.tenant_name == tenant && session.subject == subject {
                conn.del::<_, ()>(&key)
                    .await
                    .map_err(|e| GatewayError::store(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn put_login(&self, login: LoginSession) -> Result<(), GatewayError> {
        let mut conn = self.conn.write().await;
        conn.set_ex::<_, _, ()>(login_key(login.login_id), "1", LOGIN_SESSION_TTL)
            .await
            .map_err(|e| GatewayError::store(e.to_string()))
    }

    async fn consume_login(&self, login_id: Uuid) -> Result<bool, GatewayError> {
        let mut conn = self.conn.write().await;
        let deleted: i64 = conn
            .del(login_key(login_id))
            .await
            .map_err(|e| GatewayError::store(e.to_string()))?;
        Ok(deleted > 0)
    }

    async fn healthy(&self) -> bool {
        let mut conn = self.conn.write().await;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .is_ok()
    }
}
