pub mod graph;
pub mod registry;
pub mod reload;
pub mod scope;

pub use graph::{ChainResolver, CompanionGraph, resolve_chain};
pub use registry::{Registry, RegistrySnapshot};
pub use reload::ReloadCoordinator;
pub use scope::{ScopeActivationController, ScopeState};
