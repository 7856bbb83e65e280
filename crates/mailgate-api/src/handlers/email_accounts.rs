//! Admin CRUD for mailbox accounts
//!
//! Accounts arrive one at a time or as a bulk import blob of
//! `email----password----client_id----refresh_token` lines. Refresh
//! tokens and passwords are sealed before they touch the database.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Extension;
use mailgate_common::types::{EmailAccountId, EmailGroupId};
use mailgate_common::{Error, Result};
use mailgate_core::SecretBox;
use mailgate_storage::repository::{NewEmailAccount, UpdateEmailAccount};
use serde::Deserialize;
use serde_json::json;

use crate::envelope::{error_response, ok_response, RequestId};
use crate::params::Params;
use crate::state::AppState;

const BULK_SEPARATOR: &str = "----";

#[derive(Debug, Default, Deserialize)]
pub struct CreateAccountParams {
    pub email: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub refresh_token: Option<String>,
    pub group_id: Option<EmailGroupId>,
    /// Multi-line bulk import; one account per line
    pub bulk: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccountParams {
    pub client_id: Option<String>,
    pub refresh_token: Option<String>,
    pub password: Option<String>,
    pub status: Option<String>,
    pub group_id: Option<EmailGroupId>,
}

/// Parse one bulk line into account fields
fn parse_bulk_line(line: &str) -> Result<(String, Option<String>, String, String)> {
    let fields: Vec<&str> = line.split(BULK_SEPARATOR).collect();
    if fields.len() != 4 {
        return Err(Error::Validation(format!(
            "bulk line must have 4 fields separated by '{}': {line}",
            BULK_SEPARATOR
        )));
    }
    let email = fields[0].trim();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::Validation(format!("invalid email in bulk line: {line}")));
    }
    let password = fields[1].trim();
    let client_id = fields[2].trim();
    let refresh_token = fields[3].trim();
    if client_id.is_empty() || refresh_token.is_empty() {
        return Err(Error::Validation(format!(
            "client id and refresh token are required: {line}"
        )));
    }
    Ok((
        email.to_string(),
        (!password.is_empty()).then(|| password.to_string()),
        client_id.to_string(),
        refresh_token.to_string(),
    ))
}

fn seal_new_account(
    secret_box: &SecretBox,
    email: String,
    password: Option<String>,
    client_id: String,
    refresh_token: String,
    group_id: Option<EmailGroupId>,
) -> Result<NewEmailAccount> {
    Ok(NewEmailAccount {
        email,
        client_id,
        refresh_token_enc: secret_box.encrypt(&refresh_token)?,
        password_enc: password.map(|p| secret_box.encrypt(&p)).transpose()?,
        group_id,
    })
}

/// `GET /admin/email-accounts`
pub async fn list(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Response {
    match state.accounts.list_all().await {
        Ok(accounts) => ok_response(
            &request_id.0,
            json!({ "total": accounts.len(), "accounts": accounts }),
        ),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `GET /admin/email-accounts/:id`
pub async fn get(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<EmailAccountId>,
) -> Response {
    let result = async {
        state
            .accounts
            .get(id)
            .await?
            .ok_or_else(|| Error::EmailNotFound(id.to_string()))
    }
    .await;
    match result {
        Ok(account) => ok_response(&request_id.0, account),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `POST /admin/email-accounts` - single account or bulk import
pub async fn create(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Params(params): Params<CreateAccountParams>,
) -> Response {
    let result = create_inner(&state, params).await;
    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}

async fn create_inner(
    state: &AppState,
    params: CreateAccountParams,
) -> Result<serde_json::Value> {
    if let Some(group_id) = params.group_id {
        if state.groups.get(group_id).await?.is_none() {
            return Err(Error::GroupNotFound(group_id.to_string()));
        }
    }

    if let Some(bulk) = params.bulk.as_deref().filter(|b| !b.trim().is_empty()) {
        let mut created = Vec::new();
        let mut failed = Vec::new();
        for line in bulk.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let outcome = async {
                let (email, password, client_id, refresh_token) = parse_bulk_line(line)?;
                let new = seal_new_account(
                    &state.secret_box,
                    email,
                    password,
                    client_id,
                    refresh_token,
                    params.group_id,
                )?;
                state.accounts.create(new).await
            }
            .await;
            match outcome {
                Ok(account) => created.push(account.email),
                Err(e) => failed.push(json!({ "line": line, "error": e.to_string() })),
            }
        }
        return Ok(json!({
            "createdCount": created.len(),
            "created": created,
            "failedCount": failed.len(),
            "failed": failed,
        }));
    }

    let email = params
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| e.contains('@'))
        .ok_or_else(|| Error::Validation("a valid email is required".to_string()))?;
    let client_id = params
        .client_id
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Validation("client_id is required".to_string()))?;
    let refresh_token = params
        .refresh_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Validation("refresh_token is required".to_string()))?;

    let new = seal_new_account(
        &state.secret_box,
        email.to_string(),
        params.password.clone().filter(|p| !p.is_empty()),
        client_id.to_string(),
        refresh_token.to_string(),
        params.group_id,
    )?;
    let account = state.accounts.create(new).await?;
    Ok(json!({ "account": account }))
}

/// `PUT /admin/email-accounts/:id`
pub async fn update(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<EmailAccountId>,
    Params(params): Params<UpdateAccountParams>,
) -> Response {
    let result = async {
        if let Some(status) = params.status.as_deref() {
            if mailgate_common::types::AccountStatus::parse(status).is_none() {
                return Err(Error::Validation(format!("invalid status: {status}")));
            }
        }
        state
            .accounts
            .update(
                id,
                UpdateEmailAccount {
                    client_id: params.client_id,
                    refresh_token_enc: params
                        .refresh_token
                        .map(|token| state.secret_box.encrypt(&token))
                        .transpose()?,
                    password_enc: match params.password {
                        Some(password) if !password.is_empty() => {
                            Some(Some(state.secret_box.encrypt(&password)?))
                        }
                        Some(_) => Some(None),
                        None => None,
                    },
                    status: params.status,
                    group_id: params.group_id.map(Some),
                },
            )
            .await
    }
    .await;

    match result {
        Ok(account) => ok_response(&request_id.0, account),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `DELETE /admin/email-accounts/:id` - assignments cascade
pub async fn delete(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<EmailAccountId>,
) -> Response {
    let result = async {
        if !state.accounts.delete(id).await? {
            return Err(Error::EmailNotFound(id.to_string()));
        }
        Ok::<_, Error>(json!({ "message": "email account deleted" }))
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
    fn bulk_line_parses_four_fields() {
        let (email, password, client_id, token) =
            parse_bulk_line("a@x----pw123----client-1----M.R3_token").unwrap();
        assert_eq!(email, "a@x");
        assert_eq!(password.as_deref(), Some("pw123"));
        assert_eq!(client_id, "client-1");
        assert_eq!(token, "M.R3_token");
    }

    #[test]
    fn bulk_line_allows_empty_password() {
        let (_, password, _, _) = parse_bulk_line("a@x--------client----token").unwrap();
        assert_eq!(password, None);
    }

    #[test]
    fn bulk_line_rejects_bad_shapes() {
        assert!(parse_bulk_line("only----three----fields").is_err());
        assert!(parse_bulk_line("no-at-sign----p----c----t").is_err());
        assert!(parse_bulk_line("a@x----p--------t").is_err());
    }
}
