// File: rollbot-core/src/services/scope_state_service.rs

use std::sync::Arc;

use tracing::{debug, error, info};

use rollbot_common::models::{PersistedScope, RestoreReport, ScopeId};
use rollbot_common::traits::repository_traits::ScopeStateRepository;

use crate::Error;
use crate::extensions::{ReloadCoordinator, ScopeActivationController};

/// Glue between the in-memory activation engine and the scope store.
///
/// Loading happens when a scope is opened (or for all stored scopes at
/// startup); saving only happens from `flush`, never on the command path.
pub struct ScopeStateService {
    controller: Arc<ScopeActivationController>,
    coordinator: Arc<ReloadCoordinator>,
    repo: Arc<dyn ScopeStateRepository>,
}

impl ScopeStateService {
    pub fn new(
        controller: Arc<ScopeActivationController>,
        coordinator: Arc<ReloadCoordinator>,
        repo: Arc<dyn ScopeStateRepository>,
    ) -> Self {
        Self {
            controller,
            coordinator,
            repo,
        }
    }

    pub fn controller(&self) -> &Arc<ScopeActivationController> {
        &self.controller
    }

    pub fn coordinator(&self) -> &Arc<ReloadCoordinator> {
        &self.coordinator
    }

    /// Makes sure `scope` is live. Stored state is restored in snapshot
    /// order; a scope the store has never seen gets the default extensions.
    pub async fn open_scope(&self, scope: &ScopeId) -> Result<(), Error> {
        if self.controller.contains_scope(scope) {
            return Ok(());
        }
        match self.repo.load(scope).await? {
            Some(persisted) => {
                self.hydrate(scope, persisted);
            }
            None => {
                if !self.controller.contains_scope(scope) {
                    self.controller.initialize_defaults(scope);
                }
            }
        }
        Ok(())
    }

    /// Restores every scope the store knows about. Returns the number of
    /// scopes restored.
    pub async fn restore_all(&self) -> Result<usize, Error> {
        let scopes = self.repo.list_scopes().await?;
        let mut restored = 0;
        for scope in scopes {
            let Some(persisted) = self.repo.load(&scope).await? else {
                continue;
            };
            if self.hydrate(&scope, persisted).is_some() {
                restored += 1;
            }
        }
        info!("Restored {} scopes from storage", restored);
        Ok(restored)
    }

    /// `None` when another caller opened the scope first.
    fn hydrate(&self, scope: &ScopeId, persisted: PersistedScope) -> Option<RestoreReport> {
        let loaded = self.controller.registry().extensions();
        let report = self.controller.hydrate(scope, persisted, &loaded)?;
        if !report.dropped.is_empty() {
            info!(
                "Scope {}: stored extensions not loaded anymore: {:?}",
                scope, report.dropped
            );
        }
        Some(report)
    }

    /// Writes every dirty scope. A failed save is logged and the scope is
    /// flagged again so the next flush retries; in-memory state is kept.
    ///
    /// Returns the number of scopes saved.
    pub async fn flush(&self) -> usize {
        let dirty = self.controller.take_dirty();
        if dirty.is_empty() {
            return 0;
        }
        let mut saved = 0;
        for (scope, state) in dirty {
            match self.repo.save(&scope, &state).await {
                Ok(()) => {
                    saved += 1;
                    debug!("Saved scope {} ({} active)", scope, state.snapshot.len());
                }
                Err(e) => {
                    error!("Failed to save scope {}: {:?}", scope, e);
                    self.controller.mark_dirty(&scope);
                }
            }
        }
        saved
    }
}
