use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one chat context (a group, a channel, a private conversation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ScopeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The durable form of a scope's activation state.
///
/// `snapshot` is the name projection of the priority list, front first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedScope {
    pub snapshot: Vec<String>,
    #[serde(default)]
    pub overrides: BTreeSet<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// What an explicit activation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub extension: String,
    /// Every name moved to the front, in visit order (target first).
    pub touched: Vec<String>,
    /// Followers that were switched on by the cascade.
    pub companions: Vec<String>,
    /// Active extensions the target declares itself incompatible with.
    pub conflicts: Vec<String>,
}

/// What a deactivation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeactivationReport {
    pub extension: String,
    pub was_active: bool,
    /// Names removed from the priority list, target first.
    pub removed: Vec<String>,
}

/// What a reload restoration did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Names placed back according to the snapshot.
    pub restored: Vec<String>,
    /// Snapshot entries discarded because they are not loaded.
    pub dropped: Vec<String>,
    /// Names absent from the snapshot that were switched on as new.
    pub newly_activated: Vec<String>,
}
