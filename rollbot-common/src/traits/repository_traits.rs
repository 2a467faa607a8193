use async_trait::async_trait;

use crate::error::Error;
use crate::models::scope::{PersistedScope, ScopeId};

/// Durable storage for per-scope activation state.
///
/// Called only from the load path and the deferred flush task, never while a
/// scope lock is held.
#[async_trait]
pub trait ScopeStateRepository: Send + Sync {
    /// `None` when the scope has never been saved.
    async fn load(&self, scope: &ScopeId) -> Result<Option<PersistedScope>, Error>;

    async fn save(&self, scope: &ScopeId, state: &PersistedScope) -> Result<(), Error>;

    /// Every scope with a stored record, used to restore state at startup.
    async fn list_scopes(&self) -> Result<Vec<ScopeId>, Error>;
}
