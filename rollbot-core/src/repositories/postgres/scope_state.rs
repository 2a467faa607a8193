use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};

use rollbot_common::models::{PersistedScope, ScopeId};
use rollbot_common::traits::repository_traits::ScopeStateRepository;

use crate::Error;

#[derive(Clone)]
pub struct PostgresScopeStateRepository {
    pool: Pool<Postgres>,
}

impl PostgresScopeStateRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScopeStateRepository for PostgresScopeStateRepository {
    async fn load(&self, scope: &ScopeId) -> Result<Option<PersistedScope>, Error> {
        let row = sqlx::query(
            r#"
            SELECT snapshot, overrides, updated_at
            FROM scope_extension_state
            WHERE scope_id = $1
            "#,
        )
            .bind(scope.as_str())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(r) = row {
            let snapshot: Json<Vec<String>> = r.try_get("snapshot")?;
            let overrides: Json<BTreeSet<String>> = r.try_get("overrides")?;
            let updated_at: Option<DateTime<Utc>> = r.try_get("updated_at")?;
            Ok(Some(PersistedScope {
                snapshot: snapshot.0,
                overrides: overrides.0,
                updated_at,
            }))
        } else {
            Ok(None)
        }
    }

    async fn save(&self, scope: &ScopeId, state: &PersistedScope) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO scope_extension_state (scope_id, snapshot, overrides, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (scope_id)
            DO UPDATE SET
               snapshot   = EXCLUDED.snapshot,
               overrides  = EXCLUDED.overrides,
               updated_at = EXCLUDED.updated_at
            "#,
        )
            .bind(scope.as_str())
            .bind(Json(&state.snapshot))
            .bind(Json(&state.overrides))
            .bind(state.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_scopes(&self) -> Result<Vec<ScopeId>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT scope_id
            FROM scope_extension_state
            ORDER BY scope_id
            "#,
        )
            .fetch_all(&self.pool)
            .await?;

        let mut scopes = Vec::with_capacity(rows.len());
        for r in rows {
            let id: String = r.try_get("scope_id")?;
            scopes.push(ScopeId::new(id));
        }
        Ok(scopes)
    }
}
