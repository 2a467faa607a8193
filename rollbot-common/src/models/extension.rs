use std::sync::Arc;

use crate::models::command::CommandTable;
use crate::traits::command_traits::CommandHandler;

/// A named, independently toggleable extension exposing a command table.
///
/// Built once at plugin-load time and never mutated afterwards; the registry
/// hands out `Arc<Extension>` so scopes can hold cheap references.
#[derive(Debug, Clone, Default)]
pub struct Extension {
    /// Globally unique ID (case-insensitive).
    pub name: String,
    pub aliases: Vec<String>,
    /// Extensions this one follows: it switches on whenever any of them does.
    pub active_with: Vec<String>,
    /// Advisory only. Surfaced as a warning, never enforced.
    pub conflicts_with: Vec<String>,
    /// Switched on by default when a brand-new scope is created.
    pub auto_activate: bool,
    pub version: String,
    pub author: String,
    pub brief: String,
    pub commands: CommandTable,
}

impl Extension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Declares this extension a companion of each of `targets`.
    pub fn active_with<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_with = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn conflicts_with<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflicts_with = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn auto_activate(mut self, on: bool) -> Self {
        self.auto_activate = on;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_brief(mut self, brief: impl Into<String>) -> Self {
        self.brief = brief.into();
        self
    }

    pub fn with_command(mut self, name: &str, handler: Arc<dyn CommandHandler>) -> Self {
        self.commands.insert(name, handler);
        self
    }

    /// Name followed by every non-empty alias.
    pub fn lookup_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .filter(|k| !k.is_empty())
    }

    /// Short help text: brief plus the commands the extension provides.
    pub fn describe(&self) -> String {
        let mut text = format!("> {}\nCommands:\n", self.brief);
        for name in self.commands.names() {
            let help = self
                .commands
                .get(name)
                .and_then(|h| h.short_help())
                .map(str::to_string)
                .unwrap_or_else(|| format!(".{name}"));
            text.push_str(&help);
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_keys_skip_empty_aliases() {
        let ext = Extension::new("coc7").with_aliases(["coc", "", "CoC"]);
        let keys: Vec<&str> = ext.lookup_keys().collect();
        assert_eq!(keys, vec!["coc7", "coc", "CoC"]);
    }
}
