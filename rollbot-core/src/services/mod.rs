
// File: rollbot-core/src/services/mod.rs

pub mod command_router;
pub mod ext_command;
pub mod scope_state_service;

pub use command_router::CommandRouter;
pub use ext_command::ExtCommand;
pub use scope_state_service::ScopeStateService;
