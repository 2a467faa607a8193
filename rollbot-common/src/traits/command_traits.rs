use crate::models::command::{CommandArgs, CommandContext, CommandOutcome};

/// One entry of an extension's command table.
pub trait CommandHandler: Send + Sync {
    /// Returns `matched = false` to let lower-priority extensions try.
    fn solve(&self, ctx: &CommandContext, args: &CommandArgs) -> CommandOutcome;

    fn short_help(&self) -> Option<&str> {
        None
    }
}

/// A handler that always answers with the same text.
#[derive(Debug, Clone)]
pub struct StaticReply {
    pub reply: String,
    pub help: Option<String>,
}

impl StaticReply {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            help: None,
        }
    }
}

impl CommandHandler for StaticReply {
    fn solve(&self, _ctx: &CommandContext, _args: &CommandArgs) -> CommandOutcome {
        CommandOutcome::reply(self.reply.clone())
    }

    fn short_help(&self) -> Option<&str> {
        self.help.as_deref()
    }
}
