// rollbot-core/src/db/mod.rs

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::Error;
use crate::repositories::PostgresScopeStateRepository;

/// Postgres pool backing the SQL scope store.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        info!("Connected to Postgres (pool of {})", max_connections.max(1));
        Ok(Self { pool })
    }

    /// Creates or upgrades the `scope_state` table.
    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Scope store schema is up to date");
        Ok(())
    }

    pub fn scope_store(&self) -> PostgresScopeStateRepository {
        PostgresScopeStateRepository::new(self.pool.clone())
    }
}
