//! Key ring lifecycle: boot-time generation, rotation, snapshots.
//!
//! Readers take an immutable `KeyRing` snapshot per request; rotation swaps
//! the snapshot atomically, so a concurrent verification never tears.

use crate::error::GatewayError;
use crate::keys::material::date_kid;
use crate::keys::{Jwks, KeyMaterial, KeyStore};
use arc_swap::ArcSwap;
use jsonwebtoken::{DecodingKey, EncodingKey};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const LOCK_TTL: Duration = Duration::from_secs(10);
const ADOPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const ADOPT_POLL_ATTEMPTS: u32 = 60;

/// A loaded RSA key ready for signing and verification.
pub struct RingKey {
    /// Key identifier
    pub kid: String,
    /// Persisted material
    pub material: KeyMaterial,
    /// Parsed signing key
    pub encoding: EncodingKey,
    /// Parsed verification key
    pub decoding: DecodingKey,
}

impl RingKey {
    fn from_material(material: KeyMaterial) -> Result<Self, GatewayError> {
        let encoding = EncodingKey::from_rsa_pem(material.private_pem.as_bytes())
            .map_err(|e| GatewayError::keys(format!("Private key {} unusable: {e}", material.kid)))?;
        let decoding = DecodingKey::from_rsa_pem(material.public_pem.as_bytes())
            .map_err(|e| GatewayError::keys(format!("Public key {} unusable: {e}", material.kid)))?;
        Ok(Self {
            kid: material.kid.clone(),
            material,
            encoding,
            decoding,
        })
    }
}

/// Immutable snapshot of all loaded keys plus the active pointer.
#[derive(Default)]
pub struct KeyRing {
    /// Active signing kid
    pub active_kid: Option<String>,
    /// All loaded keys
    pub keys: Vec<RingKey>,
}

impl KeyRing {
    /// Find a key by kid.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&RingKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// The active signing key.
    #[must_use]
    pub fn active(&self) -> Option<&RingKey> {
        self.active_kid.as_deref().and_then(|kid| self.find(kid))
    }
}

/// Owns the key ring and its persistence.
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    ring: ArcSwap<KeyRing>,
}

impl KeyManager {
    /// Create a manager over the given store with an empty ring.
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            ring: ArcSwap::from_pointee(KeyRing::default()),
        }
    }

    /// Current immutable snapshot.
    #[must_use]
    pub fn ring(&self) -> Arc<KeyRing> {
        self.ring.load_full()
    }

    /// Ensure an active RSA key exists, competing for the cluster-wide
    /// generation lock when none does. Lock losers poll until the winner's
    /// kid appears.
    ///
    /// # Errors
    ///
    /// Fails when generation fails or no active key appears within the
    /// polling budget.
    pub async fn ensure_active(&self) -> Result<(), GatewayError> {
        self.reload().await?;
        if self.ring().active().is_some() {
            return Ok(());
        }

        if self.store.try_lock(LOCK_TTL).await? {
            info!("Generation lock acquired, creating initial signing key");
            let result = self.generate_and_activate(unique_kid(&self.kids())).await;
            self.store.unlock().await.ok();
            result?;
            return Ok(());
        }

        // Another instance is generating; adopt its key.
        for _ in 0..ADOPT_POLL_ATTEMPTS {
            tokio::time::sleep(ADOPT_POLL_INTERVAL).await;
            self.reload().await?;
            if let Some(active) = self.ring().active() {
                info!(kid = %active.kid, "Adopted signing key from peer instance");
                return Ok(());
            }
        }
        Err(GatewayError::keys(
            "No active signing key appeared within the polling budget",
        ))
    }

    /// Rotate to a freshly generated key and make it active atomically.
    ///
    /// # Errors
    ///
    /// Fails when generation or persistence fails.
    pub async fn rotate(&self, kid: Option<String>) -> Result<String, GatewayError> {
        let kid = match kid {
            Some(kid) => kid,
            None => unique_kid(&self.kids()),
        };
        self.generate_and_activate(kid.clone()).await?;
        info!(kid = %kid, "Rotated signing key");
        Ok(kid)
    }

    /// Reload the ring from the backing store and publish a new snapshot.
    ///
    /// # Errors
    ///
    /// Fails when the store cannot be read.
    pub async fn reload(&self) -> Result<(), GatewayError> {
        let materials = self.store.load_all().await?;
        let active_kid = self.store.active_kid().await?;

        let mut keys = Vec::with_capacity(materials.len());
        for material in materials {
            match RingKey::from_material(material) {
                Ok(key) => keys.push(key),
                Err(e) => warn!(error = %e, "Skipping unusable key material"),
            }
        }

        self.ring.store(Arc::new(KeyRing { active_kid, keys }));
        Ok(())
    }

    /// JWKS document over every key in the ring.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        let ring = self.ring();
        let keys = ring
            .keys
            .iter()
            .filter_map(|k| k.material.jwk().ok())
            .collect();
        Jwks { keys }
    }

    fn kids(&self) -> Vec<String> {
        self.ring().keys.iter().map(|k| k.kid.clone()).collect()
    }

    async fn generate_and_activate(&self, kid: String) -> Result<(), GatewayError> {
        let material = KeyMaterial::generate(kid.clone())?;
        self.store.save(&material).await?;
        self.store.set_active(&kid).await?;
        self.reload().await
    }
}

/// Date-based kid, suffixed on collision with an existing one.
fn unique_kid(existing: &[String]) -> String {
    let base = date_kid();
    if !existing.iter().any(|k| k == &base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !existing.iter().any(|k| k == &candidate) {
            return candidate;
        }
        n += 1;
    }
}
