// File: rollbot-common/src/models/mod.rs
pub mod command;
pub mod extension;
pub mod scope;

pub use command::{CommandArgs, CommandContext, CommandOutcome, CommandTable};
pub use extension::Extension;
pub use scope::{ActivationReport, DeactivationReport, PersistedScope, RestoreReport, ScopeId};
