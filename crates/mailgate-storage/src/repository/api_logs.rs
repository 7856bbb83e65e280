//! API call log repository

use chrono::{DateTime, Utc};
use mailgate_common::types::{ApiKeyId, EmailAccountId};
use mailgate_common::Result;

use super::db_err;
use crate::db::DatabasePool;
use crate::models::ApiLog;

const COLUMNS: &str = "id, action, api_key_id, email_account_id, client_ip, status_code, \
     elapsed_ms, metadata, created_at";

/// Fields for one log record
#[derive(Debug, Clone)]
pub struct NewApiLog {
    pub action: String,
    pub api_key_id: Option<ApiKeyId>,
    pub email_account_id: Option<EmailAccountId>,
    pub client_ip: String,
    pub status_code: i32,
    pub elapsed_ms: i64,
    pub metadata: serde_json::Value,
}

/// Listing filters for the admin console
#[derive(Debug, Clone, Default)]
pub struct ApiLogFilter {
    pub action: Option<String>,
    pub api_key_id: Option<ApiKeyId>,
    pub page: i64,
    pub per_page: i64,
}

/// Database API log repository
#[derive(Clone)]
pub struct ApiLogRepository {
    pool: DatabasePool,
}

impl ApiLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: NewApiLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO api_logs \
                 (action, api_key_id, email_account_id, client_ip, status_code, \
                  elapsed_ms, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&new.action)
        .bind(new.api_key_id)
        .bind(new.email_account_id)
        .bind(&new.client_ip)
        .bind(new.status_code)
        .bind(new.elapsed_ms)
        .bind(&new.metadata)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn list(&self, filter: &ApiLogFilter) -> Result<(Vec<ApiLog>, i64)> {
        let per_page = filter.per_page.clamp(1, 200);
        let offset = (filter.page.max(1) - 1) * per_page;

        let rows = sqlx::query_as::<_, ApiLog>(&format!(
            "SELECT {COLUMNS} FROM api_logs \
             WHERE ($1::text IS NULL OR action = $1) \
               AND ($2::bigint IS NULL OR api_key_id = $2) \
             ORDER BY id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(&filter.action)
        .bind(filter.api_key_id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM api_logs \
             WHERE ($1::text IS NULL OR action = $1) \
               AND ($2::bigint IS NULL OR api_key_id = $2)",
        )
        .bind(&filter.action)
        .bind(filter.api_key_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok((rows, total))
    }

    /// Drop records older than the retention cutoff.
    /// Returns the number of rows removed.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM api_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    pub async fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM api_logs WHERE created_at >= $1")
                .bind(since)
                .fetch_one(self.pool.pool())
                .await
                .map_err(db_err)?;
        Ok(count)
    }
}
