//! YAML file loader with change watching.
//!
//! Scans `<root>/tenants` and `<root>/clients` for YAML, loads an initial
//! snapshot synchronously (readiness blocks on it), then applies file
//! change events. Documents are keyed `path#name` so a shrinking file
//! retires its stale entities.

use crate::entities::{Entity, EntityOp, EntityStore, SourceRef};
use crate::error::GatewayError;
use crate::loaders::{parse_documents, EntityKind};
use crate::metrics;
use crate::shutdown::ShutdownSignal;
use notify::{RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Watches a directory tree of tenant and client YAML.
pub struct FileLoader {
    store: Arc<EntityStore>,
    root: PathBuf,
    loaded: HashMap<PathBuf, Vec<SourceRef>>,
}

impl FileLoader {
    /// Create a loader over the given resource root.
    #[must_use]
    pub fn new(store: Arc<EntityStore>, root: PathBuf) -> Self {
        Self {
            store,
            root,
            loaded: HashMap::new(),
        }
    }

    /// Load the initial snapshot. Failures of single files are logged and
    /// skipped; only an unreadable root is fatal.
    ///
    /// # Errors
    ///
    /// Fails when the resource root does not exist.
    pub fn load_initial(&mut self) -> Result<(), GatewayError> {
        if !self.root.is_dir() {
            return Err(GatewayError::loader(format!(
                "Resource directory {} does not exist",
                self.root.display()
            )));
        }

        for kind in [EntityKind::Tenant, EntityKind::Client] {
            let dir = self.root.join(kind.directory());
            if !dir.is_dir() {
                continue;
            }
            let entries = std::fs::read_dir(&dir)
                .map_err(|e| GatewayError::loader(format!("{}: {e}", dir.display())))?;
            for entry in entries.flatten() {
                let path = entry.path();
                if is_yaml(&path) {
                    self.reload_file(kind, &path);
                }
            }
        }

        let snapshot = self.store.snapshot();
        info!(
            tenants = snapshot.tenant_count(),
            clients = snapshot.client_count(),
            root = %self.root.display(),
            "Initial entity load complete"
        );
        Ok(())
    }

    /// Apply file change events until shutdown.
    pub async fn watch(mut self, mut shutdown: ShutdownSignal) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher = match notify::recommended_watcher(
            move |event: Result<notify::Event, notify::Error>| {
                let _ = tx.send(event);
            },
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                error!(error = %e, "File watcher unavailable");
                return;
            }
        };

        if let Err(e) = watcher.watch(&self.root, RecursiveMode::Recursive) {
            error!(error = %e, root = %self.root.display(), "Cannot watch resource directory");
            return;
        }
        info!(root = %self.root.display(), "Watching resource directory");

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(Ok(event)) => self.handle_event(&event),
                    Some(Err(e)) => {
                        metrics::LOADER_ERRORS.with_label_values(&["file"]).inc();
                        warn!(error = %e, "File watch event error");
                    }
                    None => break,
                },
                () = shutdown.recv() => break,
            }
        }
    }

    fn handle_event(&mut self, event: &notify::Event) {
        use notify::EventKind;
        for path in &event.paths {
            let Some(kind) = self.kind_for(path) else {
                continue;
            };
            match event.kind {
                EventKind::Create(_) | EventKind::Modify(_) => {
                    if path.is_file() {
                        self.reload_file(kind, path);
                    } else {
                        // Editors replacing files often surface as a modify
                        // of a now-missing path.
                        self.remove_file(path);
                    }
                }
                EventKind::Remove(_) => self.remove_file(path),
                _ => {}
            }
        }
    }

    fn reload_file(&mut self, kind: EntityKind, path: &Path) {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                metrics::LOADER_ERRORS.with_label_values(&["file"]).inc();
                warn!(path = %path.display(), error = %e, "Cannot read resource file");
                return;
            }
        };

        let (entities, errors) = parse_documents(kind, &raw);
        for e in &errors {
            metrics::LOADER_ERRORS.with_label_values(&["file"]).inc();
            warn!(path = %path.display(), error = %e, "Skipping bad document");
        }

        let refs: Vec<SourceRef> = entities
            .iter()
            .map(|entity| SourceRef::file(format!("{}#{}", path.display(), entity_name(entity))))
            .collect();

        let previous = self.loaded.insert(path.to_path_buf(), refs.clone());
        let mut batch: Vec<EntityOp> = previous
            .unwrap_or_default()
            .into_iter()
            .filter(|old| !refs.contains(old))
            .map(EntityOp::Remove)
            .collect();
        batch.extend(
            entities
                .into_iter()
                .zip(refs)
                .map(|(entity, source)| EntityOp::Upsert(entity, source)),
        );

        self.store.apply(batch);
    }

    fn remove_file(&mut self, path: &Path) {
        if let Some(refs) = self.loaded.remove(path) {
            info!(path = %path.display(), "Resource file removed");
            self.store
                .apply(refs.into_iter().map(EntityOp::Remove).collect());
        }
    }

    fn kind_for(&self, path: &Path) -> Option<EntityKind> {
        if !is_yaml(path) {
            return None;
        }
        let relative = path.strip_prefix(&self.root).ok()?;
        let first = relative.components().next()?.as_os_str().to_str()?;
        match first {
            "tenants" => Some(EntityKind::Tenant),
            "clients" => Some(EntityKind::Client),
            _ => None,
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

fn entity_name(entity: &Entity) -> &str {
    match entity {
        Entity::Tenant(t) => &t.name,
        Entity::Client(c) => &c.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_root(label: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "auth-gateway-file-loader-{label}-{}",
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(root.join("tenants")).unwrap();
        fs::create_dir_all(root.join("clients")).unwrap();
        root
    }

    const TENANT: &str = "name: acme\nconfig:\n  hosts: [acme.example.com]\n";

    #[test]
    fn test_initial_load() {
        let root = temp_root("initial");
        fs::write(root.join("tenants/acme.yaml"), TENANT).unwrap();
        fs::write(
            root.join("clients/console.yml"),
            "name: console\nconfig:\n  ident: 6a1f39e3-9176-4b8e-9e39-1a7f5575ecf1\n  tenantname: acme\n  redirect_urls: ['.*']\n  scopes: ['*']\n",
        )
        .unwrap();
        fs::write(root.join("tenants/notes.txt"), "ignored").unwrap();

        let store = Arc::new(EntityStore::new());
        let mut loader = FileLoader::new(store.clone(), root.clone());
        loader.load_initial().unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.tenant_count(), 1);
        assert_eq!(snapshot.client_count(), 1);
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_bad_file_does_not_block_good_files() {
        let root = temp_root("bad");
        fs::write(root.join("tenants/bad.yaml"), "name: bad\nconfig:\n  hosts: []\n").unwrap();
        fs::write(root.join("tenants/good.yaml"), TENANT).unwrap();

        let store = Arc::new(EntityStore::new());
        let mut loader = FileLoader::new(store.clone(), root.clone());
        loader.load_initial().unwrap();

        assert_eq!(store.snapshot().tenant_count(), 1);
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let store = Arc::new(EntityStore::new());
        let mut loader = FileLoader::new(store, PathBuf::from("/nonexistent/resources"));
        assert!(loader.load_initial().is_err());
    }

    #[test]
    fn test_reload_retires_stale_documents() {
        let root = temp_root("stale");
        let path = root.join("tenants/multi.yaml");
        fs::write(
            &path,
            format!("{TENANT}---\nname: bv\nconfig:\n  hosts: [bv.example.com]\n"),
        )
        .unwrap();

        let store = Arc::new(EntityStore::new());
        let mut loader = FileLoader::new(store.clone(), root.clone());
        loader.load_initial().unwrap();
        assert_eq!(store.snapshot().tenant_count(), 2);

        fs::write(&path, TENANT).unwrap();
        loader.reload_file(EntityKind::Tenant, &path);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.tenant_count(), 1);
        assert!(snapshot.find_tenant_by_name("acme").is_some());
        assert!(snapshot.find_tenant_by_name("bv").is_none());
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_remove_file_retires_entities() {
        let root = temp_root("remove");
        let path = root.join("tenants/acme.yaml");
        fs::write(&path, TENANT).unwrap();

        let store = Arc::new(EntityStore::new());
        let mut loader = FileLoader::new(store.clone(), root.clone());
        loader.load_initial().unwrap();
        assert_eq!(store.snapshot().tenant_count(), 1);

        loader.remove_file(&path);
        assert_eq!(store.snapshot().tenant_count(), 0);
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_kind_classification() {
        let root = temp_root("kind");
        let loader = FileLoader::new(Arc::new(EntityStore::new()), root.clone());

        assert_eq!(
            loader.kind_for(&root.join("tenants/a.yaml")),
            Some(EntityKind::Tenant)
        );
        assert_eq!(
            loader.kind_for(&root.join("clients/b.yml")),
            Some(EntityKind::Client)
        );
        assert_eq!(loader.kind_for(&root.join("tenants/a.txt")), None);
        assert_eq!(loader.kind_for(&root.join("other/a.yaml")), None);
        fs::remove_dir_all(root).ok();
    }
}
