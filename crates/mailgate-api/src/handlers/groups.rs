//! Admin CRUD for mailbox groups

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Extension;
use mailgate_common::types::{EmailGroupId, FetchStrategy};
use mailgate_common::Error;
use serde::Deserialize;
use serde_json::json;

use crate::envelope::{error_response, ok_response, RequestId};
use crate::params::Params;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct GroupParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub fetch_strategy: Option<String>,
}

fn validate_strategy(raw: Option<&str>) -> Result<Option<&str>, Error> {
    match raw {
        Some(raw) => {
            FetchStrategy::parse(raw)
                .ok_or_else(|| Error::Validation(format!("invalid fetch strategy: {raw}")))?;
            Ok(Some(raw))
        }
        None => Ok(None),
    }
}

/// `GET /admin/groups`
pub async fn list(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Response {
    match state.groups.list().await {
        Ok(groups) => ok_response(&request_id.0, json!({ "total": groups.len(), "groups": groups })),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `POST /admin/groups`
pub async fn create(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Params(params): Params<GroupParams>,
) -> Response {
    let result = async {
        let name = params
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Validation("name is required".to_string()))?;
        let strategy = validate_strategy(params.fetch_strategy.as_deref())?
            .unwrap_or(FetchStrategy::GraphFirst.as_str());
        state
            .groups
            .create(name, params.description.as_deref(), strategy)
            .await
    }
    .await;

    match result {
        Ok(group) => ok_response(&request_id.0, group),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `PUT /admin/groups/:id`
pub async fn update(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<EmailGroupId>,
    Params(params): Params<GroupParams>,
) -> Response {
    let result = async {
        let strategy = validate_strategy(params.fetch_strategy.as_deref())?;
        state
            .groups
            .update(
                id,
                params.name.as_deref(),
                params.description.as_deref().map(Some),
                strategy,
            )
            .await
    }
    .await;

    match result {
        Ok(group) => ok_response(&request_id.0, group),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `DELETE /admin/groups/:id` - mailboxes are detached, not deleted
pub async fn delete(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<EmailGroupId>,
) -> Response {
    let result = async {
        if !state.groups.delete(id).await? {
            return Err(Error::GroupNotFound(id.to_string()));
        }
        Ok::<_, Error>(json!({ "message": "group deleted" }))
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
    fn strategies_validate() {
        assert!(validate_strategy(Some("graph_first")).is_ok());
        assert!(validate_strategy(Some("imap_only")).is_ok());
        assert!(validate_strategy(None).unwrap().is_none());
        assert!(validate_strategy(Some("carrier_pigeon")).is_err());
    }
}
