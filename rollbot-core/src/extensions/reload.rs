//! extensions/reload.rs
//!
//! Puts extensions back into scopes after their code was reloaded, following
//! the persisted snapshot instead of the companion cascade so that reloads
//! never change the priority users see.

use std::sync::Arc;

use tracing::{debug, info};

use rollbot_common::models::{DeactivationReport, Extension, RestoreReport, ScopeId};

use crate::Error;
use crate::extensions::scope::ScopeActivationController;

pub struct ReloadCoordinator {
    controller: Arc<ScopeActivationController>,
}

impl ReloadCoordinator {
    pub fn new(controller: Arc<ScopeActivationController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<ScopeActivationController> {
        &self.controller
    }

    /// Restores a single hot-reloaded extension.
    ///
    /// A published scope's snapshot always mirrors its live list, so the
    /// snapshot slot of a live entry is its current index: the new build is
    /// swapped in there. An extension that is not live comes on only when it
    /// auto-activates and was never switched off by hand.
    pub fn restore_one(&self, scope: &ScopeId, ext: Arc<Extension>) -> RestoreReport {
        let handle = self.controller.scope_handle(scope);
        let mut state = handle.lock();
        let mut report = RestoreReport::default();

        if let Some(idx) = state.position(&ext.name) {
            report.restored.push(ext.name.clone());
            state.replace_at(idx, ext);
        } else if state.is_overridden(&ext.name) {
            debug!("Scope {}: '{}' is switched off, not restoring", scope, ext.name);
        } else if ext.auto_activate {
            report.newly_activated.push(ext.name.clone());
            state.move_to_front(ext);
        }
        state.sync_snapshot();

        debug!("Scope {}: restore_one -> {:?}", scope, report);
        report
    }

    /// Rebuilds the live list from the snapshot, keeping only `extensions`.
    /// Argument order is irrelevant; snapshot order always wins.
    pub fn restore_batch(&self, scope: &ScopeId, extensions: &[Arc<Extension>]) -> RestoreReport {
        let handle = self.controller.scope_handle(scope);
        let report = handle.lock().restore_from_snapshot(extensions);
        debug!("Scope {}: restore_batch -> {:?}", scope, report);
        report
    }

    /// Installs a new build of one extension and restores it in every open
    /// scope.
    pub fn reload_extension(&self, ext: Extension) -> Result<Vec<(ScopeId, RestoreReport)>, Error> {
        let registry = self.controller.registry();
        let ext = if registry.find(&ext.name).is_some() {
            registry.replace(ext)?
        } else {
            registry.register(ext)?
        };

        let reports: Vec<(ScopeId, RestoreReport)> = self
            .controller
            .scope_ids()
            .into_iter()
            .map(|scope| {
                let report = self.restore_one(&scope, Arc::clone(&ext));
                (scope, report)
            })
            .collect();
        info!("Reloaded extension '{}' in {} scopes", ext.name, reports.len());
        Ok(reports)
    }

    /// Uninstalls an extension: it is switched off in every open scope
    /// (followers included, no manual override) and then dropped from the
    /// registry, so nothing dispatches to it afterwards.
    pub fn remove_extension(
        &self,
        token: &str,
    ) -> Result<Vec<(ScopeId, DeactivationReport)>, Error> {
        let registry = self.controller.registry();
        let ext = registry
            .find(token)
            .ok_or_else(|| Error::ExtensionNotFound(token.to_string()))?;

        let mut reports = Vec::new();
        for scope in self.controller.scope_ids() {
            let report = self.controller.deactivate_system(&scope, &ext.name)?;
            reports.push((scope, report));
        }
        registry.unregister(&ext.name);
        info!(
            "Removed extension '{}' from the registry and {} scopes",
            ext.name,
            reports.len()
        );
        Ok(reports)
    }

    /// Replaces the whole extension set and restores every open scope from
    /// its snapshot.
    pub fn reload_all(&self, exts: Vec<Extension>) -> Result<Vec<(ScopeId, RestoreReport)>, Error> {
        let loaded = self.controller.registry().reset(exts)?;
        let reports: Vec<(ScopeId, RestoreReport)> = self
            .controller
            .scope_ids()
            .into_iter()
            .map(|scope| {
                let report = self.restore_batch(&scope, &loaded);
                (scope, report)
            })
            .collect();
        info!(
            "Reloaded {} extensions in {} scopes",
            loaded.len(),
            reports.len()
        );
        Ok(reports)
    }
}
