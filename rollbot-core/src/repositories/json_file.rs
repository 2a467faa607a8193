// rollbot-core/src/repositories/json_file.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use rollbot_common::models::{PersistedScope, ScopeId};
use rollbot_common::traits::repository_traits::ScopeStateRepository;

use crate::Error;

/// On-disk layout: every scope in one document.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScopeStatesFile {
    #[serde(default)]
    pub scopes: BTreeMap<ScopeId, PersistedScope>,
}

/// Scope store backed by a single pretty-printed JSON file.
///
/// The file is read once and cached; each save rewrites it through a
/// temporary file and a rename so a crash never leaves a truncated document.
pub struct JsonScopeStateRepository {
    path: PathBuf,
    cache: Mutex<Option<ScopeStatesFile>>,
}

impl JsonScopeStateRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<ScopeStatesFile, Error> {
        if !tokio::fs::try_exists(&self.path).await? {
            info!("No scope-state file at {:?}; starting empty.", self.path);
            return Ok(ScopeStatesFile::default());
        }
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let parsed: ScopeStatesFile = serde_json::from_str(&contents)?;
        info!(
            "Loaded {} scope records from {:?}",
            parsed.scopes.len(),
            self.path
        );
        Ok(parsed)
    }

    async fn write_file(&self, data: &ScopeStatesFile) -> Result<(), Error> {
        let contents = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {} scope records to {:?}", data.scopes.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl ScopeStateRepository for JsonScopeStateRepository {
    async fn load(&self, scope: &ScopeId) -> Result<Option<PersistedScope>, Error> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache
            .as_ref()
            .and_then(|file| file.scopes.get(scope).cloned()))
    }

    async fn save(&self, scope: &ScopeId, state: &PersistedScope) -> Result<(), Error> {
        let mut cache = self.cache.lock().await;
        let mut file = match cache.take() {
            Some(file) => file,
            None => self.read_file().await?,
        };
        file.scopes.insert(scope.clone(), state.clone());
        let written = self.write_file(&file).await;
        *cache = Some(file);
        written
    }

    async fn list_scopes(&self) -> Result<Vec<ScopeId>, Error> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache
            .as_ref()
            .map(|file| file.scopes.keys().cloned().collect())
            .unwrap_or_default())
    }
}
