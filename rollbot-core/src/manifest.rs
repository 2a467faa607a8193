// rollbot-core/src/manifest.rs
//
// Extension manifests: the JSON description of a plugin set handed to the
// registry at boot and on reload.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use rollbot_common::models::Extension;
use rollbot_common::traits::StaticReply;

use crate::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandManifest {
    pub name: String,
    pub reply: String,
    #[serde(default)]
    pub help: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionManifest {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub active_with: Vec<String>,
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    #[serde(default)]
    pub auto_activate: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub brief: String,
    #[serde(default)]
    pub commands: Vec<CommandManifest>,
}

impl ExtensionManifest {
    pub fn into_extension(self) -> Extension {
        let mut ext = Extension::new(self.name)
            .with_aliases(self.aliases)
            .active_with(self.active_with)
            .conflicts_with(self.conflicts_with)
            .auto_activate(self.auto_activate)
            .with_version(self.version)
            .with_author(self.author)
            .with_brief(self.brief);
        for cmd in self.commands {
            let handler = StaticReply {
                reply: cmd.reply,
                help: cmd.help,
            };
            ext = ext.with_command(&cmd.name, Arc::new(handler));
        }
        ext
    }
}

/// Parses a manifest document (a JSON array of extensions).
pub fn parse_manifest(contents: &str) -> Result<Vec<Extension>, Error> {
    let entries: Vec<ExtensionManifest> = serde_json::from_str(contents)?;
    Ok(entries
        .into_iter()
        .map(ExtensionManifest::into_extension)
        .collect())
}

pub async fn load_manifest(path: &Path) -> Result<Vec<Extension>, Error> {
    let contents = tokio::fs::read_to_string(path).await?;
    let extensions = parse_manifest(&contents)?;
    info!("Loaded {} extensions from {:?}", extensions.len(), path);
    Ok(extensions)
}
