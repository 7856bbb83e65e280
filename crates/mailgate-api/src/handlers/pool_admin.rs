//! Admin management of a credential's pool assignments

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Extension;
use mailgate_common::types::ApiKeyId;
use mailgate_common::Error;
use mailgate_core::ScopeFilter;
use serde::Deserialize;
use serde_json::json;

use crate::envelope::{error_response, ok_response, RequestId};
use crate::params::Params;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReplacePoolParams {
    pub email_ids: Option<Vec<i64>>,
}

/// `GET /admin/api-keys/:id/pool` - current assignment set
pub async fn get(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<ApiKeyId>,
) -> Response {
    let result = async {
        let key = state
            .api_keys
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("API key {id}")))?;
        let usages = state.usages.list_for_key(key.id).await?;
        let ids: Vec<i64> = usages.iter().map(|u| u.email_account_id).collect();
        let accounts = state.accounts.list_by_ids(&ids).await?;

        let used: Vec<_> = usages
            .iter()
            .map(|usage| {
                let email = accounts
                    .iter()
                    .find(|a| a.id == usage.email_account_id)
                    .map(|a| a.email.clone());
                json!({
                    "emailAccountId": usage.email_account_id,
                    "email": email,
                    "assignedAt": usage.assigned_at,
                })
            })
            .collect();
        Ok::<_, Error>(json!({ "apiKeyId": key.id, "total": used.len(), "used": used }))
    }
    .await;

    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `PUT /admin/api-keys/:id/pool` - replace the assignment set.
/// Every supplied id must fall inside the key's resolved scope.
pub async fn replace(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<ApiKeyId>,
    Params(params): Params<ReplacePoolParams>,
) -> Response {
    let result = async {
        let key = state
            .api_keys
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("API key {id}")))?;
        let ids = params
            .email_ids
            .ok_or_else(|| Error::Validation("email_ids is required".to_string()))?;

        let scope = ScopeFilter::for_key(&key);
        state.allocator.update_pool(key.id, &scope, &ids).await?;
        Ok::<_, Error>(json!({ "message": "pool updated", "total": ids.len() }))
    }
    .await;

    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}
