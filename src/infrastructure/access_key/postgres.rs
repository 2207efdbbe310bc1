//! PostgreSQL access key repository
//!
//! Keys are stored as JSONB documents in a `(key, data, created_at, updated_at)`
//! table. Mutations lock the row with `SELECT ... FOR UPDATE` inside a
//! transaction, so each state transition is a single atomic update.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::debug;

use crate::domain::access_key::{
    AccessKey, AccessKeyId, AccessKeyRepository, KeyStatusKind, Mutation, MutationOutcome,
};
use crate::domain::DomainError;

/// PostgreSQL connection settings
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            connect_timeout_secs: 30,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// PostgreSQL implementation of AccessKeyRepository
#[derive(Debug, Clone)]
pub struct PostgresAccessKeyRepository {
    pool: PgPool,
    table_name: String,
}

fn storage_error(action: &str) -> impl Fn(sqlx::Error) -> DomainError + '_ {
    move |e| DomainError::storage(format!("Failed to {}: {}", action, e))
}

fn decode(data: serde_json::Value) -> Result<AccessKey, DomainError> {
    serde_json::from_value(data)
        .map_err(|e| DomainError::storage(format!("Failed to deserialize access key: {}", e)))
}

fn encode(key: &AccessKey) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(key)
        .map_err(|e| DomainError::internal(format!("Failed to serialize access key: {}", e)))
}

impl PostgresAccessKeyRepository {
    pub const DEFAULT_TABLE: &'static str = "access_keys";

    pub fn new(pool: PgPool, table_name: impl Into<String>) -> Self {
        Self {
            pool,
            table_name: table_name.into(),
        }
    }

    /// Connect a pool and make sure the table exists
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(storage_error("connect to PostgreSQL"))?;

        let repository = Self::new(pool, Self::DEFAULT_TABLE);
        repository.ensure_table().await?;
        Ok(repository)
    }

    pub async fn ensure_table(&self) -> Result<(), DomainError> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                key VARCHAR(128) PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table_name
        );

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(storage_error("create table"))?;

        Ok(())
    }
}

#[async_trait]
impl AccessKeyRepository for PostgresAccessKeyRepository {
    async fn get(&self, key: &AccessKeyId) -> Result<Option<AccessKey>, DomainError> {
        let query = format!("SELECT data FROM {} WHERE key = $1", self.table_name);

        let row = sqlx::query(&query)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("get access key"))?;

        row.map(|row| decode(row.get("data"))).transpose()
    }

    async fn create(&self, access_key: AccessKey) -> Result<AccessKey, DomainError> {
        let query = format!(
            "INSERT INTO {} (key, data, created_at, updated_at) VALUES ($1, $2, $3, $3) ON CONFLICT (key) DO NOTHING",
            self.table_name
        );

        let result = sqlx::query(&query)
            .bind(access_key.key().as_str())
            .bind(encode(&access_key)?)
            .bind(access_key.created_at())
            .execute(&self.pool)
            .await
            .map_err(storage_error("create access key"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::conflict(format!(
                "Access key '{}' already exists",
                access_key.key()
            )));
        }

        Ok(access_key)
    }

    async fn mutate(
        &self,
        key: &AccessKeyId,
        mutation: &mut Mutation<'_>,
    ) -> Result<Option<AccessKey>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_error("begin transaction"))?;

        let select = format!(
            "SELECT data FROM {} WHERE key = $1 FOR UPDATE",
            self.table_name
        );
        let row = sqlx::query(&select)
            .bind(key.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error("lock access key"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored = decode(row.get("data"))?;
        let mut access_key = stored.clone();

        match mutation(&mut access_key) {
            MutationOutcome::Commit => {
                let update = format!(
                    "UPDATE {} SET data = $2, updated_at = $3 WHERE key = $1",
                    self.table_name
                );
                sqlx::query(&update)
                    .bind(key.as_str())
                    .bind(encode(&access_key)?)
                    .bind(access_key.updated_at())
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_error("update access key"))?;

                tx.commit().await.map_err(storage_error("commit"))?;
                debug!(key = %key, "Access key updated");
            }
            MutationOutcome::Discard => {
                tx.rollback().await.map_err(storage_error("roll back"))?;
                access_key = stored;
            }
        }

        Ok(Some(access_key))
    }

    async fn delete(&self, key: &AccessKeyId) -> Result<bool, DomainError> {
        let query = format!("DELETE FROM {} WHERE key = $1", self.table_name);

        let result = sqlx::query(&query)
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_error("delete access key"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, status: Option<KeyStatusKind>) -> Result<Vec<AccessKey>, DomainError> {
        let rows = match status {
            Some(status) => {
                let query = format!(
                    "SELECT data FROM {} WHERE data->'status'->>'state' = $1 ORDER BY created_at",
                    self.table_name
                );
                sqlx::query(&query)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let query = format!("SELECT data FROM {} ORDER BY created_at", self.table_name);
                sqlx::query(&query).fetch_all(&self.pool).await
            }
        }
        .map_err(storage_error("list access keys"))?;

        rows.into_iter().map(|row| decode(row.get("data"))).collect()
    }

    async fn count(&self, status: Option<KeyStatusKind>) -> Result<usize, DomainError> {
        let row = match status {
            Some(status) => {
                let query = format!(
                    "SELECT COUNT(*) AS count FROM {} WHERE data->'status'->>'state' = $1",
                    self.table_name
                );
                sqlx::query(&query)
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                let query = format!("SELECT COUNT(*) AS count FROM {}", self.table_name);
                sqlx::query(&query).fetch_one(&self.pool).await
            }
        }
        .map_err(storage_error("count access keys"))?;

        let count: i64 = row.get("count");
        Ok(count as usize)
    }

    async fn ping(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_error("ping PostgreSQL"))?;
        Ok(())
    }
}
