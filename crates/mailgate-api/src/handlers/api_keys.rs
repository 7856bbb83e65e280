//! Admin CRUD for API keys
//!
//! The raw secret is generated here and returned exactly once on create;
//! only its prefix and SHA-256 digest are persisted.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Extension;
use chrono::{DateTime, Utc};
use mailgate_common::types::ApiKeyId;
use mailgate_common::{Error, Result};
use mailgate_core::{normalize_action, ActionKind};
use mailgate_storage::repository::{NewApiKey, UpdateApiKey};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use crate::auth::hash_api_key;
use crate::envelope::{error_response, ok_response, RequestId};
use crate::params::Params;
use crate::state::AppState;

const KEY_PREFIX_LEN: usize = 7;

#[derive(Debug, Default, Deserialize)]
pub struct CreateApiKeyParams {
    pub name: Option<String>,
    pub rate_limit_per_minute: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub permissions: Option<serde_json::Value>,
    pub allowed_group_ids: Option<Vec<i64>>,
    pub allowed_email_ids: Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateApiKeyParams {
    pub name: Option<String>,
    pub rate_limit_per_minute: Option<i32>,
    pub enabled: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    pub permissions: Option<serde_json::Value>,
    pub allowed_group_ids: Option<Vec<i64>>,
    pub allowed_email_ids: Option<Vec<i64>>,
}

/// Generate a fresh `sk_` secret
fn generate_secret() -> String {
    let body: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    format!("sk_{}", body)
}

/// Reject unknown action keys and normalize hyphenated aliases before
/// the map is stored.
fn normalize_permissions(raw: &serde_json::Value) -> Result<serde_json::Value> {
    let map = raw
        .as_object()
        .ok_or_else(|| Error::Validation("permissions must be an object".to_string()))?;

    let mut normalized = serde_json::Map::new();
    for (key, value) in map {
        let flag = value
            .as_bool()
            .ok_or_else(|| Error::Validation(format!("permission {key} must be a boolean")))?;
        let normalized_key = normalize_action(key);
        if matches!(normalized_key.as_str(), "*" | "all" | "__all__") {
            normalized.insert(normalized_key, json!(flag));
            continue;
        }
        let action = ActionKind::parse(&normalized_key)
            .ok_or_else(|| Error::Validation(format!("unknown permission key: {key}")))?;
        normalized.insert(action.as_str().to_string(), json!(flag));
    }
    Ok(serde_json::Value::Object(normalized))
}

/// `GET /admin/api-keys`
pub async fn list(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Response {
    match state.api_keys.list().await {
        Ok(keys) => ok_response(&request_id.0, json!({ "total": keys.len(), "apiKeys": keys })),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `GET /admin/api-keys/:id`
pub async fn get(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<ApiKeyId>,
) -> Response {
    let result = async {
        state
            .api_keys
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("API key {id}")))
    }
    .await;
    match result {
        Ok(key) => ok_response(&request_id.0, key),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `POST /admin/api-keys` - returns the raw secret exactly once
pub async fn create(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<crate::auth::AdminContext>,
    Params(params): Params<CreateApiKeyParams>,
) -> Response {
    let result = async {
        let name = params
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Validation("name is required".to_string()))?;

        let permissions = params
            .permissions
            .as_ref()
            .map(normalize_permissions)
            .transpose()?;

        let secret = generate_secret();
        let key = state
            .api_keys
            .create(NewApiKey {
                name: name.to_string(),
                key_prefix: secret[..KEY_PREFIX_LEN].to_string(),
                key_hash: hash_api_key(&secret),
                rate_limit_per_minute: params.rate_limit_per_minute.unwrap_or(60).max(1),
                expires_at: params.expires_at,
                permissions,
                allowed_group_ids: params.allowed_group_ids.map(|ids| json!(ids)),
                allowed_email_ids: params.allowed_email_ids.map(|ids| json!(ids)),
                created_by: Some(ctx.admin.username.clone()),
            })
            .await?;

        Ok::<_, Error>(json!({ "apiKey": key, "secret": secret }))
    }
    .await;

    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `PUT /admin/api-keys/:id`
pub async fn update(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<ApiKeyId>,
    Params(params): Params<UpdateApiKeyParams>,
) -> Response {
    let result = async {
        let permissions = params
            .permissions
            .as_ref()
            .map(normalize_permissions)
            .transpose()?;
        state
            .api_keys
            .update(
                id,
                UpdateApiKey {
                    name: params.name,
                    rate_limit_per_minute: params.rate_limit_per_minute,
                    enabled: params.enabled,
                    expires_at: params.expires_at.map(Some),
                    permissions,
                    allowed_group_ids: params.allowed_group_ids.map(|ids| json!(ids)),
                    allowed_email_ids: params.allowed_email_ids.map(|ids| json!(ids)),
                },
            )
            .await
    }
    .await;

    match result {
        Ok(key) => ok_response(&request_id.0, key),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `DELETE /admin/api-keys/:id` - assignments cascade
pub async fn delete(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<ApiKeyId>,
) -> Response {
    let result = async {
        if !state.api_keys.delete(id).await? {
            return Err(Error::NotFound(format!("API key {id}")));
        }
        Ok::<_, Error>(json!({ "message": "API key deleted" }))
    }
    .await;
    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_shape() {
        let secret = generate_secret();
        assert!(secret.starts_with("sk_"));
        assert_eq!(secret.len(), 43);
        assert_ne!(secret, generate_secret());
        assert_eq!(secret[..KEY_PREFIX_LEN].len(), 7);
    }

    #[test]
    fn permissions_normalize_aliases() {
        let normalized =
            normalize_permissions(&json!({"Get-Email": true, "mail_new": false})).unwrap();
        assert_eq!(normalized["get_email"], json!(true));
        assert_eq!(normalized["mail_new"], json!(false));
    }

    #[test]
    fn wildcards_survive_normalization() {
        let normalized = normalize_permissions(&json!({"*": true})).unwrap();
        assert_eq!(normalized["*"], json!(true));
    }

    #[test]
    fn unknown_permission_keys_are_rejected() {
        assert!(normalize_permissions(&json!({"send_mail": true})).is_err());
        assert!(normalize_permissions(&json!({"get_email": "yes"})).is_err());
        assert!(normalize_permissions(&json!(["get_email"])).is_err());
    }
}
