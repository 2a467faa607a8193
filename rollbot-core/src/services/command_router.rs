// File: rollbot-core/src/services/command_router.rs

use std::sync::Arc;

use tracing::debug;

use rollbot_common::models::{CommandArgs, CommandContext, CommandOutcome, CommandTable};
use rollbot_common::traits::CommandHandler;

use crate::extensions::ScopeActivationController;
use crate::services::ext_command::ExtCommand;

/// Dispatches a chat line to the first handler that claims it.
///
/// Built-in commands are tried first; after that the scope's active
/// extensions are walked front to back, so the priority list decides which
/// extension answers a command name several of them define.
pub struct CommandRouter {
    controller: Arc<ScopeActivationController>,
    builtins: CommandTable,
}

impl CommandRouter {
    pub fn new(controller: Arc<ScopeActivationController>) -> Self {
        let mut builtins = CommandTable::new();
        builtins.insert("ext", Arc::new(ExtCommand::new(Arc::clone(&controller))));
        Self {
            controller,
            builtins,
        }
    }

    pub fn with_builtin(mut self, name: &str, handler: Arc<dyn CommandHandler>) -> Self {
        self.builtins.insert(name, handler);
        self
    }

    /// `None` when the text is not a command or nothing matched it.
    pub fn route(&self, ctx: &CommandContext, text: &str) -> Option<CommandOutcome> {
        let args = CommandArgs::parse(text)?;

        if let Some(handler) = self.builtins.get(&args.command) {
            let outcome = handler.solve(ctx, &args);
            if outcome.matched {
                return Some(outcome);
            }
        }

        for ext in self.controller.query(&ctx.scope) {
            let Some(handler) = ext.commands.get(&args.command) else {
                continue;
            };
            let outcome = handler.solve(ctx, &args);
            if outcome.matched {
                debug!(
                    "Scope {}: '{}' answered by extension '{}'",
                    ctx.scope, args.command, ext.name
                );
                return Some(outcome);
            }
        }

        debug!("Scope {}: no handler for '{}'", ctx.scope, args.command);
        None
    }
}
