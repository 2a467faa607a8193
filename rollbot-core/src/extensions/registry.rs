//! extensions/registry.rs
//!
//! Process-wide table of every known extension, indexed by case-folded name
//! and alias. Readers load an immutable `RegistrySnapshot` through an atomic
//! pointer; writers build a new snapshot and swap it in.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use tracing::{debug, info};

use rollbot_common::models::Extension;

use crate::Error;
use crate::extensions::graph::CompanionGraph;

fn fold(key: &str) -> String {
    key.to_lowercase()
}

/// One consistent view of the registry contents.
#[derive(Debug, Default, Clone)]
pub struct RegistrySnapshot {
    version: u64,
    extensions: Vec<Arc<Extension>>,
    index: HashMap<String, Arc<Extension>>,
}

impl RegistrySnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Every extension in registration order.
    pub fn extensions(&self) -> &[Arc<Extension>] {
        &self.extensions
    }

    /// Case-insensitive lookup by name or alias.
    pub fn find(&self, token: &str) -> Option<&Arc<Extension>> {
        self.index.get(&fold(token))
    }

    /// Fails if any of `ext`'s keys already belongs to a stored extension.
    fn check_keys(&self, ext: &Extension) -> Result<(), Error> {
        if ext.name.trim().is_empty() {
            return Err(Error::InvalidExtension(
                "extension name must not be empty".to_string(),
            ));
        }
        for key in ext.lookup_keys() {
            if let Some(existing) = self.index.get(&fold(key)) {
                return Err(Error::ExtensionCollision {
                    extension: ext.name.clone(),
                    key: key.to_string(),
                    existing: existing.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn index_keys(&mut self, ext: &Arc<Extension>) {
        for key in ext.lookup_keys() {
            self.index.insert(fold(key), Arc::clone(ext));
        }
    }

    fn unindex_keys(&mut self, ext: &Extension) {
        for key in ext.lookup_keys() {
            self.index.remove(&fold(key));
        }
    }

    fn with_added(&self, ext: Extension) -> Result<(Self, Arc<Extension>), Error> {
        self.check_keys(&ext)?;
        let ext = Arc::new(ext);
        let mut next = self.clone();
        next.index_keys(&ext);
        next.extensions.push(Arc::clone(&ext));
        next.version += 1;
        Ok((next, ext))
    }
}

/// The registry itself. Cheap to share as `Arc<Registry>`.
pub struct Registry {
    current: ArcSwap<RegistrySnapshot>,
    graph: ArcSwapOption<CompanionGraph>,
    writer: Mutex<()>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            graph: ArcSwapOption::empty(),
            writer: Mutex::new(()),
        }
    }

    /// Current contents. The returned snapshot never changes underneath you.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    pub fn find(&self, token: &str) -> Option<Arc<Extension>> {
        self.current.load().find(token).cloned()
    }

    pub fn extensions(&self) -> Vec<Arc<Extension>> {
        self.current.load().extensions.clone()
    }

    pub fn len(&self) -> usize {
        self.current.load().extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds one extension. A name or alias collision is a packaging defect:
    /// the registry is left untouched and the error should abort the load.
    pub fn register(&self, ext: Extension) -> Result<Arc<Extension>, Error> {
        let _guard = self.writer.lock();
        let (next, ext) = self.current.load().with_added(ext)?;
        self.publish(next);
        info!("Registered extension '{}' (aliases: {:?})", ext.name, ext.aliases);
        Ok(ext)
    }

    /// Registers a whole plugin set. Either every extension is stored or,
    /// on the first collision, none is.
    pub fn register_all(&self, exts: Vec<Extension>) -> Result<Vec<Arc<Extension>>, Error> {
        let _guard = self.writer.lock();
        let mut next = RegistrySnapshot::clone(&self.current.load());
        let mut added = Vec::with_capacity(exts.len());
        for ext in exts {
            let (candidate, ext) = next.with_added(ext)?;
            next = candidate;
            added.push(ext);
        }
        self.publish(next);
        info!("Registered {} extensions", added.len());
        Ok(added)
    }

    /// Swaps in a new implementation for an already registered extension,
    /// keeping its place in registration order and its stored name.
    ///
    /// Only the extension's own name identifies it here: a name that is
    /// another extension's alias is a collision.
    pub fn replace(&self, mut ext: Extension) -> Result<Arc<Extension>, Error> {
        let _guard = self.writer.lock();
        let current = self.current.load();
        let Some(old) = current.find(&ext.name).cloned() else {
            return Err(Error::ExtensionNotFound(ext.name.clone()));
        };
        if fold(&old.name) != fold(&ext.name) {
            return Err(Error::ExtensionCollision {
                key: ext.name.clone(),
                extension: ext.name,
                existing: old.name.clone(),
            });
        }
        ext.name = old.name.clone();
        let mut next = RegistrySnapshot::clone(&current);
        next.unindex_keys(&old);
        next.check_keys(&ext)?;
        let ext = Arc::new(ext);
        next.index_keys(&ext);
        if let Some(slot) = next.extensions.iter_mut().find(|e| e.name == old.name) {
            *slot = Arc::clone(&ext);
        }
        next.version += 1;
        self.publish(next);
        debug!("Replaced extension '{}'", ext.name);
        Ok(ext)
    }

    pub fn unregister(&self, token: &str) -> Option<Arc<Extension>> {
        let _guard = self.writer.lock();
        let current = self.current.load();
        let old = current.find(token).cloned()?;
        let mut next = RegistrySnapshot::clone(&current);
        next.unindex_keys(&old);
        next.extensions.retain(|e| e.name != old.name);
        next.version += 1;
        self.publish(next);
        info!("Unregistered extension '{}'", old.name);
        Some(old)
    }

    /// Replaces the whole contents, as after a full plugin runtime rebuild.
    /// All-or-nothing like `register_all`.
    pub fn reset(&self, exts: Vec<Extension>) -> Result<Vec<Arc<Extension>>, Error> {
        let _guard = self.writer.lock();
        let mut next = RegistrySnapshot {
            version: self.current.load().version,
            ..RegistrySnapshot::default()
        };
        let mut added = Vec::with_capacity(exts.len());
        for ext in exts {
            let (candidate, ext) = next.with_added(ext)?;
            next = candidate;
            added.push(ext);
        }
        next.version += 1;
        self.publish(next);
        info!("Registry reset with {} extensions", added.len());
        Ok(added)
    }

    /// Companion graph for the current contents, rebuilt if stale.
    pub fn companion_graph(&self) -> Arc<CompanionGraph> {
        let snapshot = self.snapshot();
        self.companion_graph_for(&snapshot)
    }

    /// Companion graph matching `snapshot`'s version.
    pub fn companion_graph_for(&self, snapshot: &RegistrySnapshot) -> Arc<CompanionGraph> {
        if let Some(cached) = self.graph.load_full() {
            if cached.version() == snapshot.version {
                return cached;
            }
        }
        let built = Arc::new(CompanionGraph::build(snapshot.extensions(), snapshot.version));
        debug!(
            "Rebuilt companion graph at registry version {} ({} targets)",
            built.version(),
            built.len()
        );
        if snapshot.version == self.version() {
            self.graph.store(Some(Arc::clone(&built)));
        }
        built
    }

    fn publish(&self, next: RegistrySnapshot) {
        self.current.store(Arc::new(next));
        self.graph.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_indexes_name_and_aliases_case_insensitively() {
        let registry = Registry::new();
        registry
            .register(Extension::new("CoC7").with_aliases(["coc"]))
            .unwrap();

        assert_eq!(registry.version(), 1);
        assert_eq!(registry.find("coc7").unwrap().name, "CoC7");
        assert_eq!(registry.find("COC").unwrap().name, "CoC7");
        assert!(registry.find("dnd5e").is_none());
    }

    #[test]
    fn collision_is_rejected_before_anything_is_stored() {
        let registry = Registry::new();
        registry.register(Extension::new("log")).unwrap();

        let err = registry
            .register(Extension::new("story").with_aliases(["LOG"]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ExtensionCollision { ref extension, ref existing, .. }
                if extension == "story" && existing == "log"
        ));
        assert!(err.is_fatal_configuration());
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.find("story").is_none());
    }

    #[test]
    fn register_all_is_all_or_nothing() {
        let registry = Registry::new();
        let err = registry.register_all(vec![
            Extension::new("fun"),
            Extension::new("deck"),
            Extension::new("FUN"),
        ]);
        assert!(err.is_err());
        assert!(registry.is_empty());
        assert_eq!(registry.version(), 0);
    }

    #[test]
    fn empty_name_is_invalid() {
        let registry = Registry::new();
        let err = registry.register(Extension::new("  ")).unwrap_err();
        assert!(matches!(err, Error::InvalidExtension(_)));
    }

    #[test]
    fn replace_keeps_order_and_allows_own_keys() {
        let registry = Registry::new();
        registry.register(Extension::new("a").with_aliases(["alpha"])).unwrap();
        registry.register(Extension::new("b")).unwrap();

        let fresh = registry
            .replace(Extension::new("a").with_aliases(["alpha", "first"]).with_version("2"))
            .unwrap();
        assert_eq!(fresh.version, "2");
        let names: Vec<String> = registry.extensions().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.find("first").unwrap().version, "2");
        assert_eq!(registry.version(), 3);
    }

    #[test]
    fn replace_by_alias_is_a_collision() {
        let registry = Registry::new();
        registry
            .register_all(vec![
                Extension::new("coc7").with_aliases(["coc"]),
                Extension::new("log"),
            ])
            .unwrap();

        let err = registry.replace(Extension::new("coc")).unwrap_err();
        assert!(matches!(
            err,
            Error::ExtensionCollision { ref existing, .. } if existing == "coc7"
        ));
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.find("coc7").unwrap().name, "coc7");
        assert_eq!(registry.find("coc").unwrap().name, "coc7");
    }

    #[test]
    fn replace_keeps_stored_name_for_case_variant() {
        let registry = Registry::new();
        registry.register(Extension::new("coc7")).unwrap();

        let fresh = registry
            .replace(Extension::new("COC7").with_version("2"))
            .unwrap();
        assert_eq!(fresh.name, "coc7");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("Coc7").unwrap().version, "2");
    }

    #[test]
    fn graph_cache_follows_registry_version() {
        let registry = Registry::new();
        registry.register(Extension::new("main")).unwrap();
        let first = registry.companion_graph();
        assert!(Arc::ptr_eq(&first, &registry.companion_graph()));

        registry
            .register(Extension::new("companion").active_with(["main"]))
            .unwrap();
        let second = registry.companion_graph();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.version(), registry.version());
        assert_eq!(second.followers("main"), ["companion".to_string()]);
    }

    #[test]
    fn unregister_and_reset_bump_version() {
        let registry = Registry::new();
        registry.register(Extension::new("a")).unwrap();
        assert!(registry.unregister("A").is_some());
        assert!(registry.find("a").is_none());
        assert_eq!(registry.version(), 2);

        registry
            .reset(vec![Extension::new("x"), Extension::new("y")])
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.version(), 5);
    }
}
