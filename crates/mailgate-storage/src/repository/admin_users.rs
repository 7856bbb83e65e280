//! Admin user repository

use mailgate_common::types::AdminUserId;
use mailgate_common::{Error, Result};

use super::db_err;
use crate::db::DatabasePool;
use crate::models::AdminUser;

const COLUMNS: &str = "id, username, password_hash, email, role, enabled, totp_enabled, \
     totp_secret_enc, totp_pending_secret_enc, last_login_at, last_login_ip, \
     created_at, updated_at";

/// Database admin user repository
#[derive(Clone)]
pub struct AdminUserRepository {
    pool: DatabasePool,
}

impl AdminUserRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: AdminUserId) -> Result<Option<AdminUser>> {
        sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {COLUMNS} FROM admin_users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<AdminUser>> {
        sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {COLUMNS} FROM admin_users WHERE LOWER(username) = LOWER($1)"
        ))
        .bind(username)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn list(&self) -> Result<Vec<AdminUser>> {
        sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {COLUMNS} FROM admin_users ORDER BY id ASC"
        ))
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn create(
        &self,
        username: &str,
        password_hash: &str,
        email: Option<&str>,
        role: &str,
    ) -> Result<AdminUser> {
        sqlx::query_as::<_, AdminUser>(&format!(
            "INSERT INTO admin_users (username, password_hash, email, role) \
             VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
        ))
        .bind(username)
        .bind(password_hash)
        .bind(email)
        .bind(role)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::DuplicateUsername(username.to_string())
            }
            _ => db_err(e),
        })
    }

    pub async fn update(
        &self,
        id: AdminUserId,
        email: Option<Option<&str>>,
        role: Option<&str>,
        enabled: Option<bool>,
        password_hash: Option<&str>,
    ) -> Result<AdminUser> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Admin user {id}")))?;

        sqlx::query_as::<_, AdminUser>(&format!(
            "UPDATE admin_users SET email = $2, role = $3, enabled = $4, \
                 password_hash = $5, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(email.unwrap_or(current.email.as_deref()))
        .bind(role.unwrap_or(&current.role))
        .bind(enabled.unwrap_or(current.enabled))
        .bind(password_hash.unwrap_or(&current.password_hash))
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn delete(&self, id: AdminUserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM admin_users WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_login(&self, id: AdminUserId, ip: &str) -> Result<()> {
        sqlx::query(
            "UPDATE admin_users SET last_login_at = NOW(), last_login_ip = $2, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(ip)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Store a freshly issued pending 2FA secret
    pub async fn set_pending_totp(&self, id: AdminUserId, secret_enc: &str) -> Result<()> {
        sqlx::query(
            "UPDATE admin_users SET totp_pending_secret_enc = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(secret_enc)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Promote the pending secret to active; requires a pending secret
    pub async fn enable_totp(&self, id: AdminUserId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE admin_users SET totp_enabled = TRUE, \
                 totp_secret_enc = totp_pending_secret_enc, \
                 totp_pending_secret_enc = NULL, updated_at = NOW() \
             WHERE id = $1 AND totp_pending_secret_enc IS NOT NULL",
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn disable_totp(&self, id: AdminUserId) -> Result<()> {
        sqlx::query(
            "UPDATE admin_users SET totp_enabled = FALSE, totp_secret_enc = NULL, \
                 totp_pending_secret_enc = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Discard an unconfirmed 2FA setup
    pub async fn clear_pending_totp(&self, id: AdminUserId) -> Result<()> {
        sqlx::query(
            "UPDATE admin_users SET totp_pending_secret_enc = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
