// rollbot-core/src/config.rs

use std::time::Duration;

/// Maximum number of companion levels explored from one extension.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 10;

/// How often dirty scopes are written to the store.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Connections kept by the Postgres scope store.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Tunables for the activation engine.
#[derive(Debug, Clone)]
pub struct ActivationConfig {
    pub max_chain_depth: usize,
    pub flush_interval: Duration,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}
