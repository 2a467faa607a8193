// File: rollbot-core/src/services/ext_command.rs
//
// Built-in `.ext` command: list, toggle and describe extensions in the
// current scope.

use std::sync::Arc;

use tracing::{info, warn};

use rollbot_common::models::{CommandArgs, CommandContext, CommandOutcome};
use rollbot_common::traits::CommandHandler;

use crate::Error;
use crate::extensions::ScopeActivationController;

const HELP: &str = ".ext // list extensions; .ext <name> on/off; .ext <name>";

pub struct ExtCommand {
    controller: Arc<ScopeActivationController>,
}

impl ExtCommand {
    pub fn new(controller: Arc<ScopeActivationController>) -> Self {
        Self { controller }
    }

    fn list(&self, ctx: &CommandContext) -> String {
        let registry = self.controller.registry();
        let mut text = String::from("Detected extensions (name - version - author):\n");
        for (index, ext) in registry.extensions().iter().enumerate() {
            let on = self
                .controller
                .is_active(&ctx.scope, &ext.name)
                .unwrap_or(false);
            let author = if ext.author.is_empty() {
                "<unknown>"
            } else {
                ext.author.as_str()
            };
            text.push_str(&format!(
                "{}. [{}]{} - {} - {}\n",
                index + 1,
                if on { "ON" } else { "OFF" },
                ext.name,
                ext.version,
                author
            ));
        }
        text.push_str("Use .ext <name> on/off to toggle an extension in this scope.\n");
        text.push_str("Use .ext <name> to show its description and help");
        text
    }

    fn switch_on(&self, ctx: &CommandContext, names: &[String]) -> Vec<String> {
        let mut replies = Vec::new();
        for name in names {
            match self.controller.activate(&ctx.scope, name) {
                Ok(report) => {
                    info!(
                        "Scope {}: {} switched on '{}'",
                        ctx.scope, ctx.sender, report.extension
                    );
                    let mut text = format!("Enabled extension {}", report.extension);
                    if !report.companions.is_empty() {
                        text.push_str(&format!(
                            "\nAlso enabled companions: {}",
                            report.companions.join(", ")
                        ));
                    }
                    if !report.conflicts.is_empty() {
                        text.push_str(&format!(
                            "\nPossibly conflicting extensions are on, consider disabling: {}",
                            report.conflicts.join(", ")
                        ));
                        text.push_str(
                            "\nFor commands with the same name, the extension enabled later wins.",
                        );
                    }
                    replies.push(text);
                }
                Err(Error::ExtensionNotFound(_)) => {
                    replies.push(format!("Extension not found: {}", name));
                }
                Err(e) => {
                    warn!("Failed to enable '{}' in {}: {:?}", name, ctx.scope, e);
                    replies.push(format!("Could not enable {}: {}", name, e));
                }
            }
        }
        replies
    }

    fn switch_off(&self, ctx: &CommandContext, names: &[String]) -> Vec<String> {
        let mut replies = Vec::new();
        for name in names {
            match self.controller.deactivate(&ctx.scope, name) {
                Ok(report) if report.was_active => {
                    info!(
                        "Scope {}: {} switched off '{}'",
                        ctx.scope, ctx.sender, report.extension
                    );
                    let mut text = format!("Disabled extension {}", report.extension);
                    let followers: Vec<&str> = report
                        .removed
                        .iter()
                        .skip(1)
                        .map(String::as_str)
                        .collect();
                    if !followers.is_empty() {
                        text.push_str(&format!("\nAlso disabled: {}", followers.join(", ")));
                    }
                    replies.push(text);
                }
                Ok(report) => {
                    replies.push(format!(
                        "Extension {} is already off, it will stay off in this scope",
                        report.extension
                    ));
                }
                Err(Error::ExtensionNotFound(_)) => {
                    replies.push(format!("Extension not found: {}", name));
                }
                Err(e) => {
                    warn!("Failed to disable '{}' in {}: {:?}", name, ctx.scope, e);
                    replies.push(format!("Could not disable {}: {}", name, e));
                }
            }
        }
        replies
    }

    fn describe(&self, name: &str) -> Option<String> {
        let ext = self.controller.registry().find(name)?;
        Some(format!(
            "> [{}] version {} author {}\n{}",
            ext.name,
            ext.version,
            ext.author,
            ext.describe()
        ))
    }
}

impl CommandHandler for ExtCommand {
    fn solve(&self, ctx: &CommandContext, args: &CommandArgs) -> CommandOutcome {
        if args.args.is_empty() || args.is_arg_equal(1, "list") {
            return CommandOutcome::reply(self.list(ctx));
        }

        let last = args.args.len();
        if last >= 2 && (args.is_arg_equal(last, "on") || args.is_arg_equal(last, "off")) {
            let names = &args.args[..last - 1];
            let replies = if args.is_arg_equal(last, "on") {
                self.switch_on(ctx, names)
            } else {
                self.switch_off(ctx, names)
            };
            return CommandOutcome {
                matched: true,
                solved: true,
                replies,
            };
        }

        match args.arg(1).and_then(|name| self.describe(name)) {
            Some(text) => CommandOutcome::reply(text),
            None => CommandOutcome {
                matched: true,
                solved: false,
                replies: Vec::new(),
            },
        }
    }

    fn short_help(&self) -> Option<&str> {
        Some(HELP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivationConfig;
    use crate::extensions::Registry;
    use rollbot_common::models::{Extension, ScopeId};

    fn fixture() -> (Arc<ScopeActivationController>, ExtCommand, CommandContext) {
        let registry = Arc::new(Registry::new());
        registry
            .register_all(vec![
                Extension::new("coc7").with_version("1.0").with_author("team"),
                Extension::new("story").active_with(["coc7"]),
                Extension::new("dnd5e").conflicts_with(["coc7"]),
            ])
            .unwrap();
        let controller = Arc::new(ScopeActivationController::new(
            registry,
            &ActivationConfig::default(),
        ));
        let cmd = ExtCommand::new(Arc::clone(&controller));
        let ctx = CommandContext {
            scope: ScopeId::from("group-7"),
            platform: "console".into(),
            sender: "tester".into(),
        };
        (controller, cmd, ctx)
    }

    fn run(cmd: &ExtCommand, ctx: &CommandContext, line: &str) -> CommandOutcome {
        cmd.solve(ctx, &CommandArgs::parse(line).unwrap())
    }

    #[test]
    fn on_reports_companions_and_conflicts() {
        let (controller, cmd, ctx) = fixture();

        let out = run(&cmd, &ctx, ".ext coc7 on");
        assert!(out.solved);
        assert!(out.replies[0].contains("Also enabled companions: story"));
        assert_eq!(controller.snapshot(&ctx.scope), vec!["story", "coc7"]);

        let out = run(&cmd, &ctx, ".ext dnd5e on");
        assert!(out.replies[0].contains("consider disabling: coc7"));
    }

    #[test]
    fn off_cascades_and_reports_missing() {
        let (controller, cmd, ctx) = fixture();
        run(&cmd, &ctx, ".ext coc7 on");

        let out = run(&cmd, &ctx, ".ext coc7 off");
        assert_eq!(out.replies[0], "Disabled extension coc7\nAlso disabled: story");
        assert!(controller.query(&ctx.scope).is_empty());

        let out = run(&cmd, &ctx, ".ext nothing off");
        assert_eq!(out.replies[0], "Extension not found: nothing");
    }

    #[test]
    fn off_for_inactive_extension_still_pins_it_off() {
        let (controller, cmd, ctx) = fixture();

        let out = run(&cmd, &ctx, ".ext dnd5e off");
        assert_eq!(
            out.replies[0],
            "Extension dnd5e is already off, it will stay off in this scope"
        );
        assert!(controller.is_overridden(&ctx.scope, "dnd5e").unwrap());

        run(&cmd, &ctx, ".ext coc7 on");
        run(&cmd, &ctx, ".ext coc7 off");
        let out = run(&cmd, &ctx, ".ext story off");
        assert!(out.replies[0].contains("already off"));
    }

    #[test]
    fn list_and_describe() {
        let (_controller, cmd, ctx) = fixture();
        run(&cmd, &ctx, ".ext story on");

        let out = run(&cmd, &ctx, ".ext");
        let text = &out.replies[0];
        assert!(text.contains("1. [OFF]coc7 - 1.0 - team"));
        assert!(text.contains("2. [ON]story -  - <unknown>"));

        let out = run(&cmd, &ctx, ".ext coc7");
        assert!(out.replies[0].starts_with("> [coc7] version 1.0 author team"));

        let out = run(&cmd, &ctx, ".ext missing");
        assert!(out.matched);
        assert!(!out.solved);
    }

    #[test]
    fn several_names_in_one_command() {
        let (controller, cmd, ctx) = fixture();
        let out = run(&cmd, &ctx, ".ext dnd5e story on");
        assert_eq!(out.replies.len(), 2);
        assert_eq!(controller.snapshot(&ctx.scope), vec!["story", "dnd5e"]);
    }
}
