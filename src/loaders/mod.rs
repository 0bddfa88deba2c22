//! Entity loading from YAML files and custom-resource streams.
//!
//! Both loaders share the declaration format (`name` + `config`) and feed
//! the entity store through `SourceRef`-keyed upserts. A single bad
//! document is logged and skipped, never aborting the loader.

pub mod file;
pub mod resource;

pub use file::FileLoader;
pub use resource::{ResourceAction, ResourceEvent, ResourceLoader, ResourceWatcher};

use crate::entities::{Client, ClientConfig, Entity, Tenant, TenantConfig};
use crate::error::GatewayError;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Which entity kind a source declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Tenant declarations
    Tenant,
    /// Client declarations
    Client,
}

impl EntityKind {
    /// Directory name the file loader scans for this kind.
    #[must_use]
    pub const fn directory(self) -> &'static str {
        match self {
            Self::Tenant => "tenants",
            Self::Client => "clients",
        }
    }
}

/// The declaration envelope shared by files and custom resources.
#[derive(Debug, Deserialize)]
pub struct EntityDecl<T> {
    /// Entity name
    pub name: String,
    /// Kind-specific configuration
    pub config: T,
}

/// Parse every YAML document in `raw` into entities of the given kind.
///
/// Returns the parsed entities along with per-document errors; callers log
/// the errors and keep the good documents.
#[must_use]
pub fn parse_documents(kind: EntityKind, raw: &str) -> (Vec<Entity>, Vec<GatewayError>) {
    let mut entities = Vec::new();
    let mut errors = Vec::new();

    for document in serde_yaml::Deserializer::from_str(raw) {
        let result = match kind {
            EntityKind::Tenant => decode::<TenantConfig>(document)
                .and_then(|decl| Tenant::from_config(decl.name, decl.config).map(Entity::Tenant)),
            EntityKind::Client => decode::<ClientConfig>(document)
                .and_then(|decl| Client::from_config(decl.name, decl.config).map(Entity::Client)),
        };
        match result {
            Ok(entity) => entities.push(entity),
            Err(e) => errors.push(e),
        }
    }

    (entities, errors)
}

fn decode<T: DeserializeOwned>(
    document: serde_yaml::Deserializer<'_>,
) -> Result<EntityDecl<T>, GatewayError> {
    EntityDecl::<T>::deserialize(document).map_err(|e| GatewayError::loader(e.to_string()))
}

/// Exponential backoff with full jitter; base 500 ms, cap 30 s.
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff at the loader defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
            attempt: 0,
        }
    }

    /// Next delay; the window doubles per attempt up to the cap and the
    /// actual wait is drawn uniformly from it.
    pub fn next_delay(&mut self) -> Duration {
        let window = self
            .base
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        let micros = window.as_micros().max(1) as u64;
        Duration::from_micros(rand::thread_rng().gen_range(0..micros))
    }

    /// Reset after a successful (re)connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
