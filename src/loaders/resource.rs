//! Custom-resource stream loader.
//!
//! The cluster watch wire protocol is an external collaborator behind the
//! `ResourceWatcher` trait; this loader consumes its event stream, maps
//! events onto entity store mutations, and reconnects with jittered
//! exponential backoff on stream failure.

use crate::entities::{EntityOp, EntityStore, SourceRef};
use crate::error::GatewayError;
use crate::loaders::{parse_documents, Backoff, EntityKind};
use crate::metrics;
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{info, warn};

/// Event action from the cluster API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAction {
    /// Resource added
    Added,
    /// Resource modified
    Modified,
    /// Resource deleted
    Deleted,
}

/// A single change event.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    /// What happened
    pub action: ResourceAction,
    /// Declared entity kind
    pub kind: EntityKind,
    /// Cluster-unique resource key (uid or namespaced name)
    pub key: String,
    /// Declaration manifest; absent on deletion
    pub manifest: Option<String>,
}

/// The cluster API boundary: opens long-lived event streams.
#[async_trait]
pub trait ResourceWatcher: Send + Sync {
    /// Open a fresh stream. The loader re-calls this after stream failure.
    async fn watch(
        &self,
    ) -> Result<BoxStream<'static, Result<ResourceEvent, GatewayError>>, GatewayError>;
}

/// Feeds the entity store from a custom-resource stream.
pub struct ResourceLoader {
    store: Arc<EntityStore>,
    watcher: Arc<dyn ResourceWatcher>,
}

impl ResourceLoader {
    /// Create a loader over the given watcher.
    #[must_use]
    pub fn new(store: Arc<EntityStore>, watcher: Arc<dyn ResourceWatcher>) -> Self {
        Self { store, watcher }
    }

    /// Consume events until shutdown, reconnecting on failure.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let mut backoff = Backoff::new();
        loop {
            let stream = tokio::select! {
                stream = self.watcher.watch() => stream,
                () = shutdown.recv() => return,
            };

            match stream {
                Ok(mut stream) => {
                    info!("Custom-resource stream connected");
                    backoff.reset();
                    loop {
                        let event = tokio::select! {
                            event = stream.next() => event,
                            () = shutdown.recv() => return,
                        };
                        match event {
                            Some(Ok(event)) => self.apply(event),
                            Some(Err(e)) => {
                                metrics::LOADER_ERRORS.with_label_values(&["cluster"]).inc();
                                warn!(error = %e, "Custom-resource stream error");
                                break;
                            }
                            None => {
                                warn!("Custom-resource stream ended");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    metrics::LOADER_ERRORS.with_label_values(&["cluster"]).inc();
                    warn!(error = %e, "Cannot open custom-resource stream");
                }
            }

            let delay = backoff.next_delay();
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shutdown.recv() => return,
            }
        }
    }

    fn apply(&self, event: ResourceEvent) {
        let source = SourceRef::cluster(&event.key);
        match event.action {
            ResourceAction::Added | ResourceAction::Modified => {
                let Some(manifest) = event.manifest else {
                    warn!(key = %event.key, "Change event without manifest, skipping");
                    return;
                };
                let (entities, errors) = parse_documents(event.kind, &manifest);
                for e in &errors {
                    metrics::LOADER_ERRORS.with_label_values(&["cluster"]).inc();
                    warn!(key = %event.key, error = %e, "Skipping bad resource manifest");
                }
                // A custom resource declares exactly one entity.
                if let Some(entity) = entities.into_iter().next() {
                    self.store.apply(vec![EntityOp::Upsert(entity, source)]);
                }
            }
            ResourceAction::Deleted => {
                self.store.apply(vec![EntityOp::Remove(source)]);
            }
        }
    }
}
