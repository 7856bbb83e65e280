//! API key repository

use chrono::{DateTime, Utc};
use mailgate_common::types::ApiKeyId;
use mailgate_common::{Error, Result};
use serde::Deserialize;

use super::db_err;
use crate::db::DatabasePool;
use crate::models::ApiKey;

const COLUMNS: &str = "id, name, key_prefix, key_hash, rate_limit_per_minute, enabled, \
     expires_at, permissions, allowed_group_ids, allowed_email_ids, usage_count, \
     last_used_at, created_by, created_at, updated_at";

/// Fields for creating an API key
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub rate_limit_per_minute: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub permissions: Option<serde_json::Value>,
    pub allowed_group_ids: Option<serde_json::Value>,
    pub allowed_email_ids: Option<serde_json::Value>,
    pub created_by: Option<String>,
}

/// Partial update; `None` fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateApiKey {
    pub name: Option<String>,
    pub rate_limit_per_minute: Option<i32>,
    pub enabled: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub permissions: Option<serde_json::Value>,
    pub allowed_group_ids: Option<serde_json::Value>,
    pub allowed_email_ids: Option<serde_json::Value>,
}

/// Database API key repository
#[derive(Clone)]
pub struct ApiKeyRepository {
    pool: DatabasePool,
}

impl ApiKeyRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Look up a key by the SHA-256 digest of the presented secret
    pub async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {COLUMNS} FROM api_keys WHERE key_hash = $1"
        ))
        .bind(key_hash)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn get(&self, id: ApiKeyId) -> Result<Option<ApiKey>> {
        sqlx::query_as::<_, ApiKey>(&format!("SELECT {COLUMNS} FROM api_keys WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    pub async fn list(&self) -> Result<Vec<ApiKey>> {
        sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {COLUMNS} FROM api_keys ORDER BY id ASC"
        ))
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn create(&self, new: NewApiKey) -> Result<ApiKey> {
        sqlx::query_as::<_, ApiKey>(&format!(
            "INSERT INTO api_keys \
                 (name, key_prefix, key_hash, rate_limit_per_minute, expires_at, \
                  permissions, allowed_group_ids, allowed_email_ids, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        ))
        .bind(&new.name)
        .bind(&new.key_prefix)
        .bind(&new.key_hash)
        .bind(new.rate_limit_per_minute)
        .bind(new.expires_at)
        .bind(&new.permissions)
        .bind(&new.allowed_group_ids)
        .bind(&new.allowed_email_ids)
        .bind(&new.created_by)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn update(&self, id: ApiKeyId, update: UpdateApiKey) -> Result<ApiKey> {
        let current = self.get(id).await?.ok_or_else(|| {
            Error::NotFound(format!("API key {id}"))
        })?;

        sqlx::query_as::<_, ApiKey>(&format!(
            "UPDATE api_keys SET \
                 name = $2, rate_limit_per_minute = $3, enabled = $4, expires_at = $5, \
                 permissions = $6, allowed_group_ids = $7, allowed_email_ids = $8, \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(update.name.unwrap_or(current.name))
        .bind(update.rate_limit_per_minute.unwrap_or(current.rate_limit_per_minute))
        .bind(update.enabled.unwrap_or(current.enabled))
        .bind(update.expires_at.unwrap_or(current.expires_at))
        .bind(update.permissions.or(current.permissions))
        .bind(update.allowed_group_ids.or(current.allowed_group_ids))
        .bind(update.allowed_email_ids.or(current.allowed_email_ids))
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    /// Delete a key; assignments cascade
    pub async fn delete(&self, id: ApiKeyId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Bump usage counters after successful authentication
    pub async fn record_usage(&self, id: ApiKeyId) -> Result<()> {
        sqlx::query(
            "UPDATE api_keys SET usage_count = usage_count + 1, last_used_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys")
            .fetch_one(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(count)
    }
}
