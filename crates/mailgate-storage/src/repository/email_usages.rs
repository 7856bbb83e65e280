//! Pool assignment repository
//!
//! The `(api_key_id, email_account_id)` primary key is the sole arbiter of
//! exactly-once allocation; every mutation here leans on it.

use mailgate_common::types::{ApiKeyId, EmailAccountId, EmailGroupId};
use mailgate_common::Result;

use super::db_err;
use crate::db::DatabasePool;
use crate::models::EmailUsage;

/// Database pool assignment repository
#[derive(Clone)]
pub struct EmailUsageRepository {
    pool: DatabasePool,
}

impl EmailUsageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert an assignment. Returns `false` when the pair already exists,
    /// which callers surface as `AlreadyUsed`.
    pub async fn insert(&self, api_key_id: ApiKeyId, account_id: EmailAccountId) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO email_usages (api_key_id, email_account_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(api_key_id)
        .bind(account_id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Assignments for one credential, most recent first
    pub async fn list_for_key(&self, api_key_id: ApiKeyId) -> Result<Vec<EmailUsage>> {
        sqlx::query_as::<_, EmailUsage>(
            "SELECT api_key_id, email_account_id, assigned_at FROM email_usages \
             WHERE api_key_id = $1 ORDER BY assigned_at DESC",
        )
        .bind(api_key_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    /// Count assignments whose mailbox is active and inside the scope;
    /// the pool-stats `used`.
    pub async fn count_for_key(
        &self,
        api_key_id: ApiKeyId,
        group_id: Option<EmailGroupId>,
        allowed_group_ids: Option<&[i64]>,
        allowed_email_ids: Option<&[i64]>,
    ) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM email_usages u \
             JOIN email_accounts a ON a.id = u.email_account_id \
             WHERE u.api_key_id = $1 \
               AND a.status = 'active' \
               AND ($2::bigint IS NULL OR a.group_id = $2) \
               AND ($3::bigint[] IS NULL OR a.group_id = ANY($3)) \
               AND ($4::bigint[] IS NULL OR a.id = ANY($4))",
        )
        .bind(api_key_id)
        .bind(group_id)
        .bind(allowed_group_ids)
        .bind(allowed_email_ids)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(count)
    }

    /// Remove assignments restricted to the scope and group filter.
    /// Returns the number of rows removed.
    pub async fn delete_for_key(
        &self,
        api_key_id: ApiKeyId,
        group_id: Option<EmailGroupId>,
        allowed_group_ids: Option<&[i64]>,
        allowed_email_ids: Option<&[i64]>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM email_usages u USING email_accounts a \
             WHERE a.id = u.email_account_id \
               AND u.api_key_id = $1 \
               AND ($2::bigint IS NULL OR a.group_id = $2) \
               AND ($3::bigint[] IS NULL OR a.group_id = ANY($3)) \
               AND ($4::bigint[] IS NULL OR a.id = ANY($4))",
        )
        .bind(api_key_id)
        .bind(group_id)
        .bind(allowed_group_ids)
        .bind(allowed_email_ids)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    /// Replace the assignment set for one credential in a single
    /// transaction, inserting and deleting only the difference.
    pub async fn replace_for_key(
        &self,
        api_key_id: ApiKeyId,
        account_ids: &[EmailAccountId],
    ) -> Result<()> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        sqlx::query(
            "DELETE FROM email_usages \
             WHERE api_key_id = $1 AND email_account_id <> ALL($2)",
        )
        .bind(api_key_id)
        .bind(account_ids)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO email_usages (api_key_id, email_account_id) \
             SELECT $1, id FROM UNNEST($2::bigint[]) AS t(id) \
             ON CONFLICT DO NOTHING",
        )
        .bind(api_key_id)
        .bind(account_ids)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }
}
