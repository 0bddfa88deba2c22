//! Key persistence with a cluster-wide generation lock.
//!
//! Keys live under `jwt:keys:{kid}`, the active pointer under
//! `jwt:keys:active`, and the generation lock under `jwt:keys:lock`.

use crate::error::GatewayError;
use crate::keys::KeyMaterial;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const ACTIVE_KEY: &str = "jwt:keys:active";
const LOCK_KEY: &str = "jwt:keys:lock";

/// Key persistence capability set.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Load every stored key pair.
    async fn load_all(&self) -> Result<Vec<KeyMaterial>, GatewayError>;

    /// Persist a key pair under its kid.
    async fn save(&self, material: &KeyMaterial) -> Result<(), GatewayError>;

    /// Remove a key pair.
    async fn remove(&self, kid: &str) -> Result<(), GatewayError>;

    /// Current active kid, if any.
    async fn active_kid(&self) -> Result<Option<String>, GatewayError>;

    /// Point the active kid at the given key.
    async fn set_active(&self, kid: &str) -> Result<(), GatewayError>;

    /// Try to take the cluster-wide generation lock. True on acquisition.
    async fn try_lock(&self, ttl: Duration) -> Result<bool, GatewayError>;

    /// Release the generation lock.
    async fn unlock(&self) -> Result<(), GatewayError>;
}

/// In-process key store for single-node deployments and tests.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, KeyMaterial>>,
    active: Mutex<Option<String>>,
    lock_until: Mutex<Option<Instant>>,
}

impl MemoryKeyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn load_all(&self) -> Result<Vec<KeyMaterial>, GatewayError> {
        let mut keys: Vec<KeyMaterial> = self.keys.lock().values().cloned().collect();
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        Ok(keys)
    }

    async fn save(&self, material: &KeyMaterial) -> Result<(), GatewayError> {
        self.keys
            .lock()
            .insert(material.kid.clone(), material.clone());
        Ok(())
    }

    async fn remove(&self, kid: &str) -> Result<(), GatewayError> {
        self.keys.lock().remove(kid);
        Ok(())
    }

    async fn active_kid(&self) -> Result<Option<String>, GatewayError> {
        Ok(self.active.lock().clone())
    }

    async fn set_active(&self, kid: &str) -> Result<(), GatewayError> {
        *self.active.lock() = Some(kid.to_string());
        Ok(())
    }

    async fn try_lock(&self, ttl: Duration) -> Result<bool, GatewayError> {
        let mut lock = self.lock_until.lock();
        let now = Instant::now();
        match *lock {
            Some(until) if until > now => Ok(false),
            _ => {
                *lock = Some(now + ttl);
                Ok(true)
            }
        }
    }

    async fn unlock(&self) -> Result<(), GatewayError> {
        *self.lock_until.lock() = None;
        Ok(())
    }
}

/// Redis key store for replicated deployments.
pub struct RedisKeyStore {
    conn: Arc<RwLock<ConnectionManager>>,
}

impl RedisKeyStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL cannot be parsed.
    pub async fn new(redis_url: &str) -> Result<Self, GatewayError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| GatewayError::keys(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::keys(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(RwLock::new(conn)),
        })
    }

    fn material_key(kid: &str) -> String {
        format!("jwt:keys:{kid}")
    }
}

#[async_trait]
impl KeyStore for RedisKeyStore {
    async fn load_all(&self) -> Result<Vec<KeyMaterial>, GatewayError> {
        let mut scan_conn = self.conn.read().await.clone();
        let mut iter = scan_conn
            .scan_match::<_, String>("jwt:keys:*")
            .await
            .map_err(|e| GatewayError::keys(e.to_string()))?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            if key != ACTIVE_KEY && key != LOCK_KEY {
                keys.push(key);
            }
        }
        drop(iter);

        let mut conn = self.conn.write().await;
        let mut out = Vec::new();
        for key in keys {
            let value: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| GatewayError::keys(e.to_string()))?;
            let Some(value) = value else { continue };
            match serde_json::from_str::<KeyMaterial>(&value) {
                Ok(material) => out.push(material),
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping undecodable key material"),
            }
        }
        out.sort_by(|a, b| a.kid.cmp(&b.kid));
        Ok(out)
    }

    async fn save(&self, material: &KeyMaterial) -> Result<(), GatewayError> {
        let value =
            serde_json::to_string(material).map_err(|e| GatewayError::keys(e.to_string()))?;
        let mut conn = self.conn.write().await;
        conn.set::<_, _, ()>(Self::material_key(&material.kid), value)
            .await
            .map_err(|e| GatewayError::keys(e.to_string()))
    }

    async fn remove(&self, kid: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.write().await;
        conn.del::<_, ()>(Self::material_key(kid))
            .await
            .map_err(|e| GatewayError::keys(e.to_string()))
    }

    async fn active_kid(&self) -> Result<Option<String>, GatewayError> {
        let mut conn = self.conn.write().await;
        conn.get(ACTIVE_KEY)
            .await
            .map_err(|e| GatewayError::keys(e.to_string()))
    }

    async fn set_active(&self, kid: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.write().await;
        conn.set::<_, _, ()>(ACTIVE_KEY, kid)
            .await
            .map_err(|e| GatewayError::keys(e.to_string()))
    }

    async fn try_lock(&self, ttl: Duration) -> Result<bool, GatewayError> {
        let mut conn = self.conn.write().await;
        let acquired: Option<String> = redis::cmd("SET")
            .arg(LOCK_KEY)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut *conn)
            .await
            .map_err(|e| GatewayError::keys(e.to_string()))?;
        Ok(acquired.is_some())
    }

    async fn unlock(&self) -> Result<(), GatewayError> {
        let mut conn = self.conn.write().await;
        conn.del::<_, ()>(LOCK_KEY)
            .await
            .map_err(|e| GatewayError::keys(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(kid: &str) -> KeyMaterial {
        KeyMaterial {
            kid: kid.to_string(),
            private_pem: "priv".to_string(),
            public_pem: "pub".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_save_load_remove() {
        let store = MemoryKeyStore::new();
        store.save(&material("a")).await.unwrap();
        store.save(&material("b")).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kid, "a");

        store.remove("a").await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_active_pointer() {
        let store = MemoryKeyStore::new();
        assert!(store.active_kid().await.unwrap().is_none());
        store.set_active("2024-11-01").await.unwrap();
        assert_eq!(store.active_kid().await.unwrap().unwrap(), "2024-11-01");
    }

    #[tokio::test]
    async fn test_memory_lock_mutual_exclusion() {
        let store = MemoryKeyStore::new();
        assert!(store.try_lock(Duration::from_secs(5)).await.unwrap());
        assert!(!store.try_lock(Duration::from_secs(5)).await.unwrap());
        store.unlock().await.unwrap();
        assert!(store.try_lock(Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_lock_expires() {
        let store = MemoryKeyStore::new();
        assert!(store.try_lock(Duration::from_millis(1)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.try_lock(Duration::from_secs(5)).await.unwrap());
    }

    #[test]
    fn test_redis_key_scheme() {
        assert_eq!(RedisKeyStore::material_key("abc"), "jwt:keys:abc");
    }
}
