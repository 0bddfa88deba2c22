//! Tenant and client entities and the snapshot-based entity store.

pub mod client;
pub mod store;
pub mod tenant;

pub use client::{Client, ClientConfig, GrantType};
pub use store::{EntityChange, EntityOp, EntityStore};
pub use tenant::{InterceptorSettings, Tenant, TenantConfig};

use serde::{Deserialize, Serialize};

/// Origin kind of a loaded entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceOrigin {
    /// Loaded from a YAML file
    File,
    /// Loaded from a cluster custom resource
    Cluster,
}

/// Deduplication identity of a loaded entity.
///
/// An entity re-arriving with the same `SourceRef` replaces the prior value;
/// a deletion removes whatever the ref currently maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Where the entity came from
    pub origin: SourceOrigin,
    /// Origin-scoped key (file path, resource uid)
    pub key: String,
}

impl SourceRef {
    /// Create a file-origin ref.
    #[must_use]
    pub fn file(key: impl Into<String>) -> Self {
        Self {
            origin: SourceOrigin::File,
            key: key.into(),
        }
    }

    /// Create a cluster-origin ref.
    #[must_use]
    pub fn cluster(key: impl Into<String>) -> Self {
        Self {
            origin: SourceOrigin::Cluster,
            key: key.into(),
        }
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let origin = match self.origin {
            SourceOrigin::File => "file",
            SourceOrigin::Cluster => "cluster",
        };
        write!(f, "{origin}:{}", self.key)
    }
}

/// A loadable entity.
#[derive(Debug, Clone)]
pub enum Entity {
    /// A tenant definition
    Tenant(Tenant),
    /// A client definition
    Client(Client),
}

impl Entity {
    /// Kind label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tenant(_) => "tenant",
            Self::Client(_) => "client",
        }
    }
}
