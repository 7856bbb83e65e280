//! Database models

use chrono::{DateTime, Utc};
use mailgate_common::types::{
    AccountStatus, AdminRole, AdminUserId, ApiKeyId, ApiLogId, EmailAccountId, EmailGroupId,
    FetchStrategy,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// API key (external credential) model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub name: String,
    /// First 7 characters of the raw secret, shown in listings
    pub key_prefix: String,
    /// SHA-256 hex digest of the full secret
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub rate_limit_per_minute: i32,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Sparse action map, `{action: bool}`; absent or empty allows all
    pub permissions: Option<serde_json::Value>,
    pub allowed_group_ids: Option<serde_json::Value>,
    pub allowed_email_ids: Option<serde_json::Value>,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Check if the API key has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| at < Utc::now())
    }

    /// Permission map as owned pairs, if one is set
    pub fn permission_map(&self) -> Option<Vec<(String, bool)>> {
        let map = self.permissions.as_ref()?.as_object()?;
        Some(
            map.iter()
                .map(|(key, value)| (key.clone(), value.as_bool().unwrap_or(false)))
                .collect(),
        )
    }

    /// Allow-listed group ids; `None` when unrestricted
    pub fn allowed_group_ids_vec(&self) -> Option<Vec<i64>> {
        ids_from_json(self.allowed_group_ids.as_ref())
    }

    /// Allow-listed mailbox ids; `None` when unrestricted
    pub fn allowed_email_ids_vec(&self) -> Option<Vec<i64>> {
        ids_from_json(self.allowed_email_ids.as_ref())
    }
}

/// An empty allow-list means "no restriction", same as an absent one.
fn ids_from_json(value: Option<&serde_json::Value>) -> Option<Vec<i64>> {
    let ids: Vec<i64> = value?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    (!ids.is_empty()).then_some(ids)
}

/// Mailbox account model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailAccount {
    pub id: EmailAccountId,
    pub email: String,
    pub client_id: String,
    /// Sealed refresh token, opaque outside the secret box
    #[serde(skip_serializing)]
    pub refresh_token_enc: String,
    #[serde(skip_serializing)]
    pub password_enc: Option<String>,
    pub status: String,
    pub group_id: Option<EmailGroupId>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailAccount {
    pub fn account_status(&self) -> AccountStatus {
        AccountStatus::parse(&self.status).unwrap_or(AccountStatus::Error)
    }
}

/// Mailbox group model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailGroup {
    pub id: EmailGroupId,
    pub name: String,
    pub description: Option<String>,
    pub fetch_strategy: String,
    pub created_at: DateTime<Utc>,
}

impl EmailGroup {
    pub fn strategy(&self) -> FetchStrategy {
        FetchStrategy::parse(&self.fetch_strategy).unwrap_or(FetchStrategy::GraphFirst)
    }
}

/// Exactly-once record that a mailbox was handed to a credential
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailUsage {
    pub api_key_id: ApiKeyId,
    pub email_account_id: EmailAccountId,
    pub assigned_at: DateTime<Utc>,
}

/// Admin user model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: AdminUserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: Option<String>,
    pub role: String,
    pub enabled: bool,
    pub totp_enabled: bool,
    #[serde(skip_serializing)]
    pub totp_secret_enc: Option<String>,
    #[serde(skip_serializing)]
    pub totp_pending_secret_enc: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdminUser {
    pub fn admin_role(&self) -> AdminRole {
        AdminRole::parse(&self.role).unwrap_or(AdminRole::Admin)
    }
}

/// Append-only record of an external API invocation
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiLog {
    pub id: ApiLogId,
    pub action: String,
    pub api_key_id: Option<ApiKeyId>,
    pub email_account_id: Option<EmailAccountId>,
    pub client_ip: String,
    pub status_code: i32,
    pub elapsed_ms: i64,
    /// Carries at least the request id
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with(permissions: Option<serde_json::Value>) -> ApiKey {
        ApiKey {
            id: 1,
            name: "test".into(),
            key_prefix: "sk_abcd".into(),
            key_hash: "0".repeat(64),
            rate_limit_per_minute: 60,
            enabled: true,
            expires_at: None,
            permissions,
            allowed_group_ids: None,
            allowed_email_ids: None,
            usage_count: 0,
            last_used_at: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn expiry_check() {
        let mut key = key_with(None);
        assert!(!key.is_expired());
        key.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
        assert!(key.is_expired());
    }

    #[test]
    fn empty_allow_list_means_unrestricted() {
        let mut key = key_with(None);
        key.allowed_group_ids = Some(serde_json::json!([]));
        assert_eq!(key.allowed_group_ids_vec(), None);
        key.allowed_group_ids = Some(serde_json::json!([7, 9]));
        assert_eq!(key.allowed_group_ids_vec(), Some(vec![7, 9]));
    }

    #[test]
    fn secrets_never_serialize() {
        let key = key_with(Some(serde_json::json!({"get_email": true})));
        let json = serde_json::to_value(&key).unwrap();
        assert!(json.get("key_hash").is_none());
        assert!(json.get("key_prefix").is_some());
    }
}
