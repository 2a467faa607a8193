// ================================================================
// File: rollbot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No registered extension matches the given name or alias.
    #[error("Extension not found: {0}")]
    ExtensionNotFound(String),

    /// Two extensions claim the same case-folded name or alias. Raised at
    /// registration time, before anything is stored.
    #[error("Extension <{extension}> name {key:?} collides with extension <{existing}>")]
    ExtensionCollision {
        extension: String,
        key: String,
        existing: String,
    },

    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// True for errors that indicate a packaging defect and must abort startup.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, Error::ExtensionCollision { .. } | Error::InvalidExtension(_))
    }
}
