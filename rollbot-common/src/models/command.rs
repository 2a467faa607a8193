use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::models::scope::ScopeId;
use crate::traits::command_traits::CommandHandler;

/// Characters that mark a chat line as a command (`.r 1d20`, `。r`, `!r`).
pub const COMMAND_PREFIXES: &[char] = &['.', '。', '!', '！'];

/// A chat line split into a command name and whitespace-separated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs {
    /// Lower-cased command name without its prefix.
    pub command: String,
    pub args: Vec<String>,
    /// Everything after the command name, untrimmed of inner spacing.
    pub raw_args: String,
}

impl CommandArgs {
    /// Returns `None` when the text does not start with a command prefix or
    /// carries no command name.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let rest = trimmed.strip_prefix(|c: char| COMMAND_PREFIXES.contains(&c))?;
        let rest = rest.trim_start();
        let name_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (name, raw_args) = rest.split_at(name_end);
        if name.is_empty() {
            return None;
        }
        let raw_args = raw_args.trim().to_string();
        let args = raw_args.split_whitespace().map(str::to_string).collect();
        Some(Self {
            command: name.to_lowercase(),
            args,
            raw_args,
        })
    }

    /// 1-based positional argument.
    pub fn arg(&self, index: usize) -> Option<&str> {
        index.checked_sub(1).and_then(|i| self.args.get(i)).map(String::as_str)
    }

    /// Case-insensitive comparison of the 1-based argument at `index`.
    pub fn is_arg_equal(&self, index: usize, expected: &str) -> bool {
        self.arg(index)
            .map(|a| a.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }
}

/// Where a command came from.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub scope: ScopeId,
    pub platform: String,
    pub sender: String,
}

/// Result of offering a command to a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The handler recognised the command; routing stops here.
    pub matched: bool,
    /// The handler produced a final answer.
    pub solved: bool,
    pub replies: Vec<String>,
}

impl CommandOutcome {
    pub fn not_matched() -> Self {
        Self::default()
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            matched: true,
            solved: true,
            replies: vec![text.into()],
        }
    }
}

/// Command name -> handler, keyed case-insensitively.
#[derive(Clone, Default)]
pub struct CommandTable {
    handlers: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(name.to_lowercase(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
