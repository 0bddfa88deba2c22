//! Snapshot-based entity store.
//!
//! Mutations come only from resource loaders; every reader works against an
//! immutable snapshot taken at the start of its request. Batch mutations
//! publish a fresh snapshot atomically and emit change notifications.

use crate::entities::{Client, Entity, SourceRef, Tenant};
use crate::metrics;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Change notification emitted after a batch mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityChange {
    /// The tenant set changed
    Tenants,
    /// The client set changed
    Clients,
}

/// A single loader mutation.
#[derive(Debug, Clone)]
pub enum EntityOp {
    /// Insert or replace the entity stored under the ref
    Upsert(Entity, SourceRef),
    /// Remove whatever the ref currently maps to
    Remove(SourceRef),
}

#[derive(Debug, Clone)]
struct StoredTenant {
    tenant: Tenant,
    source: SourceRef,
}

#[derive(Debug, Clone)]
struct StoredClient {
    client: Client,
    source: SourceRef,
}

/// Immutable view of all loaded entities. Insertion order is preserved and
/// breaks host-match ties.
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    tenants: Vec<StoredTenant>,
    clients: Vec<StoredClient>,
}

impl EntitySet {
    /// Exact host match first, then wildcard patterns, first-insertion wins.
    #[must_use]
    pub fn find_tenant_by_host(&self, host: &str) -> Option<&Tenant> {
        self.tenants
            .iter()
            .find(|s| s.tenant.matches_host_exactly(host))
            .or_else(|| self.tenants.iter().find(|s| s.tenant.matches_host(host)))
            .map(|s| &s.tenant)
    }

    /// Look a tenant up by its unique name.
    #[must_use]
    pub fn find_tenant_by_name(&self, name: &str) -> Option<&Tenant> {
        self.tenants
            .iter()
            .find(|s| s.tenant.name == name)
            .map(|s| &s.tenant)
    }

    /// Look a client up by its UUID.
    #[must_use]
    pub fn find_client_by_ident(&self, ident: Uuid) -> Option<&Client> {
        self.clients
            .iter()
            .find(|s| s.client.ident == ident)
            .map(|s| &s.client)
    }

    /// All clients belonging to a tenant, in insertion order.
    #[must_use]
    pub fn clients_for(&self, tenant_name: &str) -> Vec<&Client> {
        self.clients
            .iter()
            .filter(|s| s.client.tenant_name == tenant_name)
            .map(|s| &s.client)
            .collect()
    }

    /// Number of loaded tenants.
    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    /// Number of loaded clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// The shared entity store.
pub struct EntityStore {
    snapshot: ArcSwap<EntitySet>,
    changes: broadcast::Sender<EntityChange>,
}

impl EntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            snapshot: ArcSwap::from_pointee(EntitySet::default()),
            changes,
        }
    }

    /// Current immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<EntitySet> {
        self.snapshot.load_full()
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EntityChange> {
        self.changes.subscribe()
    }

    /// Apply a batch of loader mutations and publish a new snapshot.
    ///
    /// Only loaders call this; concurrent batches serialize on the caller
    /// side (one loader task per source).
    pub fn apply(&self, batch: Vec<EntityOp>) {
        if batch.is_empty() {
            return;
        }

        let mut set = EntitySet::clone(&self.snapshot.load());
        let mut tenants_changed = false;
        let mut clients_changed = false;

        for op in batch {
            match op {
                EntityOp::Upsert(Entity::Tenant(tenant), source) => {
                    tenants_changed = true;
                    match set.tenants.iter_mut().find(|s| s.source == source) {
                        Some(slot) => slot.tenant = tenant,
                        None => set.tenants.push(StoredTenant { tenant, source }),
                    }
                }
                EntityOp::Upsert(Entity::Client(client), source) => {
                    clients_changed = true;
                    match set.clients.iter_mut().find(|s| s.source == source) {
                        Some(slot) => slot.client = client,
                        None => set.clients.push(StoredClient { client, source }),
                    }
                }
                EntityOp::Remove(source) => {
                    let before_tenants = set.tenants.len();
                    let before_clients = set.clients.len();
                    set.tenants.retain(|s| s.source != source);
                    set.clients.retain(|s| s.source != source);
                    tenants_changed |= set.tenants.len() != before_tenants;
                    clients_changed |= set.clients.len() != before_clients;
                }
            }
        }

        metrics::ENTITIES_LOADED
            .with_label_values(&["tenant"])
            .set(set.tenants.len() as i64);
        metrics::ENTITIES_LOADED
            .with_label_values(&["client"])
            .set(set.clients.len() as i64);

        self.snapshot.store(Arc::new(set));

        if tenants_changed {
            let _ = self.changes.send(EntityChange::Tenants);
        }
        if clients_changed {
            let _ = self.changes.send(EntityChange::Clients);
        }
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
