//! extensions/scope.rs
//!
//! Per-scope activation state and the operations that mutate it.
//!
//! Each scope owns an ordered priority list (front wins command-name
//! collisions), a manual-override set and the persisted name snapshot. The
//! triple lives behind one `parking_lot::Mutex` per scope; scopes are kept in
//! a `DashMap` so that different chat contexts never contend.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use rollbot_common::models::{
    ActivationReport, DeactivationReport, Extension, PersistedScope, RestoreReport, ScopeId,
};

use crate::Error;
use crate::config::ActivationConfig;
use crate::extensions::graph::ChainResolver;
use crate::extensions::registry::{Registry, RegistrySnapshot};

/// Mutable state of one scope. Only reachable through the scope's mutex.
#[derive(Debug, Default)]
pub struct ScopeState {
    priority: Vec<Arc<Extension>>,
    overrides: BTreeSet<String>,
    snapshot: Vec<String>,
    updated_at: Option<DateTime<Utc>>,
    dirty: bool,
}

impl ScopeState {
    /// State loaded from storage with an empty live list. Only valid until
    /// `restore_from_snapshot` has run; never published in that form.
    fn from_persisted(persisted: PersistedScope) -> Self {
        Self {
            priority: Vec::new(),
            overrides: persisted.overrides,
            snapshot: persisted.snapshot,
            updated_at: persisted.updated_at,
            dirty: false,
        }
    }

    pub fn persisted(&self) -> PersistedScope {
        PersistedScope {
            snapshot: self.snapshot.clone(),
            overrides: self.overrides.clone(),
            updated_at: self.updated_at,
        }
    }

    pub fn priority(&self) -> &[Arc<Extension>] {
        &self.priority
    }

    pub fn snapshot(&self) -> &[String] {
        &self.snapshot
    }

    pub fn overrides(&self) -> &BTreeSet<String> {
        &self.overrides
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.priority.iter().position(|e| e.name == name)
    }

    pub(crate) fn is_overridden(&self, name: &str) -> bool {
        self.overrides.contains(name)
    }

    /// Removes `ext` if present, then inserts it at index 0.
    pub(crate) fn move_to_front(&mut self, ext: Arc<Extension>) {
        if let Some(idx) = self.position(&ext.name) {
            self.priority.remove(idx);
        }
        self.priority.insert(0, ext);
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(idx) => {
                self.priority.remove(idx);
                true
            }
            None => false,
        }
    }

    pub(crate) fn replace_at(&mut self, idx: usize, ext: Arc<Extension>) {
        self.priority[idx] = ext;
    }

    /// Rebuilds the live list from the snapshot, keeping only `extensions`.
    /// Argument order is irrelevant; snapshot order always wins. Unseen
    /// `auto_activate` extensions that were never switched off go to the front.
    pub(crate) fn restore_from_snapshot(&mut self, extensions: &[Arc<Extension>]) -> RestoreReport {
        let supplied: HashMap<&str, &Arc<Extension>> =
            extensions.iter().map(|e| (e.name.as_str(), e)).collect();
        let mut report = RestoreReport::default();

        let mut rebuilt: Vec<Arc<Extension>> = Vec::with_capacity(self.snapshot.len());
        let mut placed: HashSet<String> = HashSet::new();
        for name in &self.snapshot {
            let restorable = supplied
                .get(name.as_str())
                .filter(|_| !self.overrides.contains(name) && !placed.contains(name));
            match restorable {
                Some(ext) => {
                    placed.insert(name.clone());
                    rebuilt.push(Arc::clone(ext));
                    report.restored.push(name.clone());
                }
                None => report.dropped.push(name.clone()),
            }
        }

        for ext in extensions {
            let seen = placed.contains(&ext.name)
                || self.overrides.contains(&ext.name)
                || self.snapshot.iter().any(|n| *n == ext.name);
            if !ext.auto_activate || seen {
                continue;
            }
            placed.insert(ext.name.clone());
            rebuilt.insert(0, Arc::clone(ext));
            report.newly_activated.push(ext.name.clone());
        }

        self.priority = rebuilt;
        self.sync_snapshot();
        report
    }

    /// Re-projects the live list into the snapshot. Every mutating operation
    /// ends here, so the two are equal whenever the lock is released.
    pub(crate) fn sync_snapshot(&mut self) {
        self.snapshot = self.priority.iter().map(|e| e.name.clone()).collect();
        self.updated_at = Some(Utc::now());
        self.dirty = true;
    }

    fn take_dirty(&mut self) -> Option<PersistedScope> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.persisted())
    }
}

fn matches_any(ext: &Extension, names: &[String]) -> bool {
    names.iter().any(|n| {
        let n = n.to_lowercase();
        ext.lookup_keys().any(|k| k.to_lowercase() == n)
    })
}

/// Owns every scope's activation state and applies activate / deactivate.
pub struct ScopeActivationController {
    registry: Arc<Registry>,
    resolver: ChainResolver,
    scopes: DashMap<ScopeId, Arc<Mutex<ScopeState>>>,
}

impl ScopeActivationController {
    pub fn new(registry: Arc<Registry>, config: &ActivationConfig) -> Self {
        Self {
            registry,
            resolver: ChainResolver::new(config.max_chain_depth),
            scopes: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handle to a scope's state, creating an empty scope on first use.
    ///
    /// The map guard is released before the handle is returned; callers lock
    /// the scope mutex afterwards.
    pub(crate) fn scope_handle(&self, scope: &ScopeId) -> Arc<Mutex<ScopeState>> {
        if let Some(existing) = self.scopes.get(scope) {
            return Arc::clone(existing.value());
        }
        let entry = self.scopes.entry(scope.clone()).or_default();
        Arc::clone(entry.value())
    }

    fn existing_handle(&self, scope: &ScopeId) -> Option<Arc<Mutex<ScopeState>>> {
        self.scopes.get(scope).map(|h| Arc::clone(h.value()))
    }

    fn lookup(&self, snapshot: &RegistrySnapshot, token: &str) -> Result<Arc<Extension>, Error> {
        snapshot
            .find(token)
            .cloned()
            .ok_or_else(|| Error::ExtensionNotFound(token.to_string()))
    }

    /// The extensions that transitively follow `ext`, depth-ascending.
    fn chain_of(&self, snapshot: &RegistrySnapshot, ext: &Extension) -> Vec<Arc<Extension>> {
        let graph = self.registry.companion_graph_for(snapshot);
        self.resolver
            .resolve(&graph, &ext.name)
            .iter()
            .filter_map(|name| snapshot.find(name).cloned())
            .collect()
    }

    /// Switches `token` on together with its whole companion chain.
    ///
    /// The target is moved to the front first and then every chain member in
    /// depth order, so the deepest companion ends up with the highest
    /// priority. Every touched name loses its manual override.
    pub fn activate(&self, scope: &ScopeId, token: &str) -> Result<ActivationReport, Error> {
        let snapshot = self.registry.snapshot();
        let ext = self.lookup(&snapshot, token)?;
        let chain = self.chain_of(&snapshot, &ext);

        let handle = self.scope_handle(scope);
        let mut state = handle.lock();

        let conflicts: Vec<String> = state
            .priority
            .iter()
            .filter(|active| active.name != ext.name && matches_any(active, &ext.conflicts_with))
            .map(|active| active.name.clone())
            .collect();

        let mut report = ActivationReport {
            extension: ext.name.clone(),
            conflicts,
            ..ActivationReport::default()
        };

        for member in std::iter::once(ext).chain(chain) {
            let was_active = state.position(&member.name).is_some();
            if !was_active && member.name != report.extension {
                report.companions.push(member.name.clone());
            }
            state.overrides.remove(&member.name);
            report.touched.push(member.name.clone());
            state.move_to_front(member);
        }
        state.sync_snapshot();

        debug!(
            "Scope {}: activated '{}' (touched {:?}), priority now {:?}",
            scope, report.extension, report.touched, state.snapshot
        );
        Ok(report)
    }

    /// Switches `token` off and records a manual override for it. Followers
    /// that are currently active are switched off as well, without override.
    pub fn deactivate(&self, scope: &ScopeId, token: &str) -> Result<DeactivationReport, Error> {
        self.remove_with_followers(scope, token, true)
    }

    /// Like `deactivate` but leaves no manual override, for removals not
    /// requested by a user (e.g. an uninstalled plugin).
    pub fn deactivate_system(
        &self,
        scope: &ScopeId,
        token: &str,
    ) -> Result<DeactivationReport, Error> {
        self.remove_with_followers(scope, token, false)
    }

    fn remove_with_followers(
        &self,
        scope: &ScopeId,
        token: &str,
        manual: bool,
    ) -> Result<DeactivationReport, Error> {
        let snapshot = self.registry.snapshot();
        let ext = self.lookup(&snapshot, token)?;
        let chain = self.chain_of(&snapshot, &ext);

        let handle = self.scope_handle(scope);
        let mut state = handle.lock();

        let mut report = DeactivationReport {
            extension: ext.name.clone(),
            was_active: state.remove(&ext.name),
            removed: Vec::new(),
        };
        if report.was_active {
            report.removed.push(ext.name.clone());
        }
        if manual {
            state.overrides.insert(ext.name.clone());
        }
        for member in chain {
            if state.remove(&member.name) {
                report.removed.push(member.name.clone());
            }
        }
        state.sync_snapshot();

        debug!(
            "Scope {}: deactivated '{}' (removed {:?}, manual: {}), priority now {:?}",
            scope, report.extension, report.removed, manual, state.snapshot
        );
        Ok(report)
    }

    /// True when `token` was explicitly switched off in `scope`.
    pub fn is_overridden(&self, scope: &ScopeId, token: &str) -> Result<bool, Error> {
        let ext = self.lookup(&self.registry.snapshot(), token)?;
        Ok(self
            .existing_handle(scope)
            .map(|h| h.lock().is_overridden(&ext.name))
            .unwrap_or(false))
    }

    pub fn is_active(&self, scope: &ScopeId, token: &str) -> Result<bool, Error> {
        let ext = self.lookup(&self.registry.snapshot(), token)?;
        Ok(self
            .existing_handle(scope)
            .map(|h| h.lock().position(&ext.name).is_some())
            .unwrap_or(false))
    }

    /// Active extensions of `scope`, highest priority first.
    pub fn query(&self, scope: &ScopeId) -> Vec<Arc<Extension>> {
        self.existing_handle(scope)
            .map(|h| h.lock().priority.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self, scope: &ScopeId) -> Vec<String> {
        self.existing_handle(scope)
            .map(|h| h.lock().snapshot.clone())
            .unwrap_or_default()
    }

    pub fn persisted(&self, scope: &ScopeId) -> Option<PersistedScope> {
        self.existing_handle(scope).map(|h| h.lock().persisted())
    }

    pub fn scope_ids(&self) -> Vec<ScopeId> {
        self.scopes.iter().map(|e| e.key().clone()).collect()
    }

    pub fn contains_scope(&self, scope: &ScopeId) -> bool {
        self.scopes.contains_key(scope)
    }

    /// Opens a scope from stored state, restored against `extensions` before
    /// it is published, so no command ever sees it half-restored.
    ///
    /// Returns `None` (and leaves the live scope alone) if the scope is
    /// already open.
    pub fn hydrate(
        &self,
        scope: &ScopeId,
        persisted: PersistedScope,
        extensions: &[Arc<Extension>],
    ) -> Option<RestoreReport> {
        if self.scopes.contains_key(scope) {
            return None;
        }
        let mut state = ScopeState::from_persisted(persisted);
        let report = state.restore_from_snapshot(extensions);

        let mut inserted = false;
        self.scopes.entry(scope.clone()).or_insert_with(|| {
            inserted = true;
            Arc::new(Mutex::new(state))
        });
        if !inserted {
            return None;
        }
        debug!("Scope {} hydrated from storage: {:?}", scope, report);
        Some(report)
    }

    /// Brand-new scope: switch on every `auto_activate` extension in
    /// registration order.
    pub fn initialize_defaults(&self, scope: &ScopeId) -> Vec<ActivationReport> {
        let defaults: Vec<Arc<Extension>> = self
            .registry
            .extensions()
            .into_iter()
            .filter(|e| e.auto_activate)
            .collect();

        let mut reports = Vec::with_capacity(defaults.len());
        for ext in defaults {
            if let Ok(report) = self.activate(scope, &ext.name) {
                reports.push(report);
            }
        }
        // Make sure an empty default set still produces a record.
        self.scope_handle(scope).lock().sync_snapshot();
        info!(
            "Scope {} created with {} default extensions",
            scope,
            reports.len()
        );
        reports
    }

    /// Collects and clears the dirty flag of every scope.
    pub fn take_dirty(&self) -> Vec<(ScopeId, PersistedScope)> {
        let handles: Vec<(ScopeId, Arc<Mutex<ScopeState>>)> = self
            .scopes
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        handles
            .into_iter()
            .filter_map(|(id, handle)| handle.lock().take_dirty().map(|p| (id, p)))
            .collect()
    }

    /// Flags a scope for the next flush again, e.g. after a failed save.
    pub fn mark_dirty(&self, scope: &ScopeId) {
        if let Some(handle) = self.existing_handle(scope) {
            handle.lock().dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(name: &str) -> Arc<Extension> {
        Arc::new(Extension::new(name))
    }

    fn names(state: &ScopeState) -> Vec<&str> {
        state.priority().iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn move_to_front_keeps_entries_distinct() {
        let mut state = ScopeState::default();
        state.move_to_front(ext("a"));
        state.move_to_front(ext("b"));
        state.move_to_front(ext("a"));
        assert_eq!(names(&state), vec!["a", "b"]);
    }

    #[test]
    fn sync_snapshot_projects_names_and_marks_dirty() {
        let mut state = ScopeState::default();
        state.move_to_front(ext("a"));
        state.move_to_front(ext("b"));
        assert!(!state.is_dirty());

        state.sync_snapshot();
        assert_eq!(state.snapshot(), ["b".to_string(), "a".to_string()]);
        assert!(state.updated_at().is_some());

        let persisted = state.take_dirty().unwrap();
        assert_eq!(persisted.snapshot, vec!["b", "a"]);
        assert!(state.take_dirty().is_none());
    }

    #[test]
    fn restore_from_snapshot_follows_stored_order() {
        let mut state = ScopeState::from_persisted(PersistedScope {
            snapshot: vec!["a".into(), "gone".into(), "b".into()],
            overrides: ["c".to_string()].into_iter().collect(),
            updated_at: None,
        });
        assert!(!state.is_dirty());

        let c = Arc::new(Extension::new("c").auto_activate(true));
        let d = Arc::new(Extension::new("d").auto_activate(true));
        let report = state.restore_from_snapshot(&[ext("b"), c, d, ext("a")]);
        assert_eq!(names(&state), vec!["d", "a", "b"]);
        assert_eq!(report.dropped, vec!["gone"]);
        assert_eq!(report.newly_activated, vec!["d"]);
        assert_eq!(state.snapshot().len(), 3);
        assert!(state.is_dirty());
    }

    #[test]
    fn hydrated_scope_is_restored_before_first_command() {
        let registry = Arc::new(Registry::new());
        registry
            .register_all(vec![
                Extension::new("a"),
                Extension::new("b"),
                Extension::new("x"),
            ])
            .unwrap();
        let controller =
            ScopeActivationController::new(Arc::clone(&registry), &ActivationConfig::default());
        let scope = ScopeId::from("g");
        let stored = PersistedScope {
            snapshot: vec!["a".into(), "b".into()],
            ..PersistedScope::default()
        };

        let report = controller
            .hydrate(&scope, stored.clone(), &registry.extensions())
            .unwrap();
        assert_eq!(report.restored, vec!["a", "b"]);
        assert!(controller.hydrate(&scope, stored, &registry.extensions()).is_none());

        controller.activate(&scope, "x").unwrap();
        assert_eq!(controller.snapshot(&scope), vec!["x", "a", "b"]);
    }

    #[test]
    fn conflicts_are_reported_but_not_enforced() {
        let registry = Arc::new(Registry::new());
        registry
            .register_all(vec![
                Extension::new("coc7").with_aliases(["coc"]),
                Extension::new("dnd5e").conflicts_with(["COC"]),
            ])
            .unwrap();
        let controller = ScopeActivationController::new(registry, &ActivationConfig::default());
        let scope = ScopeId::from("group-1");

        controller.activate(&scope, "coc7").unwrap();
        let report = controller.activate(&scope, "dnd5e").unwrap();
        assert_eq!(report.conflicts, vec!["coc7"]);
        assert_eq!(controller.snapshot(&scope), vec!["dnd5e", "coc7"]);
    }

    #[test]
    fn unknown_extension_leaves_scope_untouched() {
        let registry = Arc::new(Registry::new());
        registry.register(Extension::new("a")).unwrap();
        let controller = ScopeActivationController::new(registry, &ActivationConfig::default());
        let scope = ScopeId::from("g");
        controller.activate(&scope, "a").unwrap();
        controller.take_dirty();

        assert!(matches!(
            controller.activate(&scope, "nope"),
            Err(Error::ExtensionNotFound(_))
        ));
        assert!(matches!(
            controller.deactivate(&scope, "nope"),
            Err(Error::ExtensionNotFound(_))
        ));
        assert!(controller.is_overridden(&scope, "nope").is_err());
        assert_eq!(controller.snapshot(&scope), vec!["a"]);
        assert!(controller.take_dirty().is_empty());
    }
}
