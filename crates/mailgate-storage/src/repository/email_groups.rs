//! Mailbox group repository

use mailgate_common::types::EmailGroupId;
use mailgate_common::{Error, Result};

use super::db_err;
use crate::db::DatabasePool;
use crate::models::EmailGroup;

const COLUMNS: &str = "id, name, description, fetch_strategy, created_at";

/// Database mailbox group repository
#[derive(Clone)]
pub struct EmailGroupRepository {
    pool: DatabasePool,
}

impl EmailGroupRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: EmailGroupId) -> Result<Option<EmailGroup>> {
        sqlx::query_as::<_, EmailGroup>(&format!(
            "SELECT {COLUMNS} FROM email_groups WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<EmailGroup>> {
        sqlx::query_as::<_, EmailGroup>(&format!(
            "SELECT {COLUMNS} FROM email_groups WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn list(&self) -> Result<Vec<EmailGroup>> {
        sqlx::query_as::<_, EmailGroup>(&format!(
            "SELECT {COLUMNS} FROM email_groups ORDER BY id ASC"
        ))
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        fetch_strategy: &str,
    ) -> Result<EmailGroup> {
        sqlx::query_as::<_, EmailGroup>(&format!(
            "INSERT INTO email_groups (name, description, fetch_strategy) \
             VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        ))
        .bind(name)
        .bind(description)
        .bind(fetch_strategy)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::GroupExists(name.to_string())
            }
            _ => db_err(e),
        })
    }

    pub async fn update(
        &self,
        id: EmailGroupId,
        name: Option<&str>,
        description: Option<Option<&str>>,
        fetch_strategy: Option<&str>,
    ) -> Result<EmailGroup> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::GroupNotFound(id.to_string()))?;

        sqlx::query_as::<_, EmailGroup>(&format!(
            "UPDATE email_groups SET name = $2, description = $3, fetch_strategy = $4 \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(name.unwrap_or(&current.name))
        .bind(description.unwrap_or(current.description.as_deref()))
        .bind(fetch_strategy.unwrap_or(&current.fetch_strategy))
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    /// Deleting a group detaches its mailboxes (FK is ON DELETE SET NULL)
    pub async fn delete(&self, id: EmailGroupId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM email_groups WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}
