//! Mailbox account repository

use mailgate_common::types::{AccountStatus, EmailAccountId, EmailGroupId};
use mailgate_common::{Error, Result};
use serde::Deserialize;

use super::db_err;
use crate::db::DatabasePool;
use crate::models::EmailAccount;

const COLUMNS: &str = "id, email, client_id, refresh_token_enc, password_enc, status, \
     group_id, last_checked_at, last_error, created_at, updated_at";

/// Fields for creating a mailbox account
#[derive(Debug, Clone)]
pub struct NewEmailAccount {
    pub email: String,
    pub client_id: String,
    pub refresh_token_enc: String,
    pub password_enc: Option<String>,
    pub group_id: Option<EmailGroupId>,
}

/// Partial update; `None` fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEmailAccount {
    pub client_id: Option<String>,
    pub refresh_token_enc: Option<String>,
    pub password_enc: Option<Option<String>>,
    pub status: Option<String>,
    pub group_id: Option<Option<EmailGroupId>>,
}

/// Database mailbox account repository
#[derive(Clone)]
pub struct EmailAccountRepository {
    pool: DatabasePool,
}

impl EmailAccountRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: EmailAccountId) -> Result<Option<EmailAccount>> {
        sqlx::query_as::<_, EmailAccount>(&format!(
            "SELECT {COLUMNS} FROM email_accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<EmailAccount>> {
        sqlx::query_as::<_, EmailAccount>(&format!(
            "SELECT {COLUMNS} FROM email_accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    /// List accounts visible through the caller's scope, optionally pinned
    /// to one group.
    pub async fn list_in_scope(
        &self,
        group_id: Option<EmailGroupId>,
        allowed_group_ids: Option<&[i64]>,
        allowed_email_ids: Option<&[i64]>,
    ) -> Result<Vec<EmailAccount>> {
        sqlx::query_as::<_, EmailAccount>(&format!(
            "SELECT {COLUMNS} FROM email_accounts \
             WHERE ($1::bigint IS NULL OR group_id = $1) \
               AND ($2::bigint[] IS NULL OR group_id = ANY($2)) \
               AND ($3::bigint[] IS NULL OR id = ANY($3)) \
             ORDER BY id ASC"
        ))
        .bind(group_id)
        .bind(allowed_group_ids)
        .bind(allowed_email_ids)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn list_by_ids(&self, ids: &[EmailAccountId]) -> Result<Vec<EmailAccount>> {
        sqlx::query_as::<_, EmailAccount>(&format!(
            "SELECT {COLUMNS} FROM email_accounts WHERE id = ANY($1) ORDER BY id ASC"
        ))
        .bind(ids)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    /// All accounts, for the admin console
    pub async fn list_all(&self) -> Result<Vec<EmailAccount>> {
        sqlx::query_as::<_, EmailAccount>(&format!(
            "SELECT {COLUMNS} FROM email_accounts ORDER BY id ASC"
        ))
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    /// Lowest-id active account in scope that the credential has not used
    pub async fn allocate_candidate(
        &self,
        api_key_id: i64,
        group_id: Option<EmailGroupId>,
        allowed_group_ids: Option<&[i64]>,
        allowed_email_ids: Option<&[i64]>,
    ) -> Result<Option<EmailAccount>> {
        sqlx::query_as::<_, EmailAccount>(&format!(
            "SELECT {COLUMNS} FROM email_accounts a \
             WHERE a.status = 'active' \
               AND NOT EXISTS (\
                   SELECT 1 FROM email_usages u \
                   WHERE u.api_key_id = $1 AND u.email_account_id = a.id) \
               AND ($2::bigint IS NULL OR a.group_id = $2) \
               AND ($3::bigint[] IS NULL OR a.group_id = ANY($3)) \
               AND ($4::bigint[] IS NULL OR a.id = ANY($4)) \
             ORDER BY a.id ASC LIMIT 1"
        ))
        .bind(api_key_id)
        .bind(group_id)
        .bind(allowed_group_ids)
        .bind(allowed_email_ids)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    /// Count active accounts in scope; the pool-stats `total`
    pub async fn count_in_scope(
        &self,
        group_id: Option<EmailGroupId>,
        allowed_group_ids: Option<&[i64]>,
        allowed_email_ids: Option<&[i64]>,
    ) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM email_accounts \
             WHERE status = 'active' \
               AND ($1::bigint IS NULL OR group_id = $1) \
               AND ($2::bigint[] IS NULL OR group_id = ANY($2)) \
               AND ($3::bigint[] IS NULL OR id = ANY($3))",
        )
        .bind(group_id)
        .bind(allowed_group_ids)
        .bind(allowed_email_ids)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(count)
    }

    pub async fn create(&self, new: NewEmailAccount) -> Result<EmailAccount> {
        sqlx::query_as::<_, EmailAccount>(&format!(
            "INSERT INTO email_accounts \
                 (email, client_id, refresh_token_enc, password_enc, group_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        ))
        .bind(&new.email)
        .bind(&new.client_id)
        .bind(&new.refresh_token_enc)
        .bind(&new.password_enc)
        .bind(new.group_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::DuplicateEmail(new.email.clone())
            }
            _ => db_err(e),
        })
    }

    pub async fn update(
        &self,
        id: EmailAccountId,
        update: UpdateEmailAccount,
    ) -> Result<EmailAccount> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::EmailNotFound(id.to_string()))?;

        sqlx::query_as::<_, EmailAccount>(&format!(
            "UPDATE email_accounts SET \
                 client_id = $2, refresh_token_enc = $3, password_enc = $4, \
                 status = $5, group_id = $6, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(update.client_id.unwrap_or(current.client_id))
        .bind(update.refresh_token_enc.unwrap_or(current.refresh_token_enc))
        .bind(update.password_enc.unwrap_or(current.password_enc))
        .bind(update.status.unwrap_or(current.status))
        .bind(update.group_id.unwrap_or(current.group_id))
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn delete(&self, id: EmailAccountId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM email_accounts WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the outcome of a fetch attempt
    pub async fn mark_status(
        &self,
        id: EmailAccountId,
        status: AccountStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE email_accounts SET status = $2, last_error = $3, \
                 last_checked_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM email_accounts")
            .fetch_one(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(count)
    }

    pub async fn count_by_status(&self, status: AccountStatus) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM email_accounts WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(self.pool.pool())
                .await
                .map_err(db_err)?;
        Ok(count)
    }
}
