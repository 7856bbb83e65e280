//! Admin user management (super-admin only)

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Extension;
use mailgate_common::types::{AdminRole, AdminUserId};
use mailgate_common::Error;
use mailgate_core::hash_password;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{require_super_admin, AdminContext};
use crate::envelope::{error_response, ok_response, RequestId};
use crate::params::Params;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateAdminParams {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAdminParams {
    pub email: Option<String>,
    pub role: Option<String>,
    pub enabled: Option<bool>,
    pub password: Option<String>,
}

fn validate_role(raw: Option<&str>) -> Result<Option<&str>, Error> {
    match raw {
        Some(raw) => {
            AdminRole::parse(raw)
                .ok_or_else(|| Error::Validation(format!("invalid role: {raw}")))?;
            Ok(Some(raw))
        }
        None => Ok(None),
    }
}

/// `GET /admin/admins`
pub async fn list(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<AdminContext>,
) -> Response {
    let result = async {
        require_super_admin(&ctx)?;
        state.admins.list().await
    }
    .await;
    match result {
        Ok(admins) => ok_response(&request_id.0, json!({ "total": admins.len(), "admins": admins })),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `POST /admin/admins`
pub async fn create(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<AdminContext>,
    Params(params): Params<CreateAdminParams>,
) -> Response {
    let result = async {
        require_super_admin(&ctx)?;
        let username = params
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Validation("username is required".to_string()))?;
        let password = params
            .password
            .as_deref()
            .filter(|p| p.len() >= 8)
            .ok_or_else(|| {
                Error::Validation("password of at least 8 characters is required".to_string())
            })?;
        let role = validate_role(params.role.as_deref())?.unwrap_or(AdminRole::Admin.as_str());

        let password_hash = hash_password(password)?;
        state
            .admins
            .create(username, &password_hash, params.email.as_deref(), role)
            .await
    }
    .await;

    match result {
        Ok(admin) => ok_response(&request_id.0, admin),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `PUT /admin/admins/:id`
pub async fn update(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<AdminUserId>,
    Params(params): Params<UpdateAdminParams>,
) -> Response {
    let result = async {
        require_super_admin(&ctx)?;
        // An operator cannot lock themselves out by disabling their own row
        if params.enabled == Some(false) && id == ctx.admin.id {
            return Err(Error::Validation(
                "cannot disable your own account".to_string(),
            ));
        }
        let role = validate_role(params.role.as_deref())?;
        let password_hash = params
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(hash_password)
            .transpose()?;
        state
            .admins
            .update(
                id,
                params.email.as_deref().map(Some),
                role,
                params.enabled,
                password_hash.as_deref(),
            )
            .await
    }
    .await;

    match result {
        Ok(admin) => ok_response(&request_id.0, admin),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `DELETE /admin/admins/:id`
pub async fn delete(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<AdminUserId>,
) -> Response {
    let result = async {
        require_super_admin(&ctx)?;
        if id == ctx.admin.id {
            return Err(Error::Validation("cannot delete your own account".to_string()));
        }
        if !state.admins.delete(id).await? {
            return Err(Error::NotFound(format!("admin user {id}")));
        }
        Ok::<_, Error>(json!({ "message": "admin user deleted" }))
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
    fn roles_validate() {
        assert!(validate_role(Some("admin")).is_ok());
        assert!(validate_role(Some("super_admin")).is_ok());
        assert!(validate_role(Some("owner")).is_err());
        assert!(validate_role(None).unwrap().is_none());
    }
}
