//! External key-authenticated API handlers
//!
//! Each handler recovers errors into the JSON envelope at this boundary;
//! `/api/mail_text` renders plain text instead.

use axum::extract::State;
use axum::response::Response;
use axum::Extension;
use mailgate_common::types::{FetchStrategy, MailFolder};
use mailgate_common::{Error, Result};
use mailgate_core::fetch::orchestrator::FetchOutcome;
use mailgate_core::{MailMessage, ProxyConfig, ScopeFilter};
use mailgate_storage::models::EmailAccount;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::auth::ApiKeyContext;
use crate::envelope::{error_response, ok_response, plain_error, plain_ok, with_mailbox, RequestId};
use crate::params::Params;
use crate::state::AppState;

/// Unbounded fetches still page at the Graph maximum
const UNBOUNDED_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct GroupParams {
    pub group: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MailParams {
    pub email: Option<String>,
    pub mailbox: Option<String>,
    pub socks5: Option<String>,
    pub http: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MailTextParams {
    pub email: Option<String>,
    #[serde(rename = "match")]
    pub pattern: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(format!("parameter {name} is required")))
}

impl MailParams {
    fn proxy(&self) -> ProxyConfig {
        ProxyConfig {
            socks5: self.socks5.clone(),
            http: self.http.clone(),
        }
    }
}

/// Load an account by address and enforce the credential scope
async fn visible_account(
    state: &AppState,
    scope: &ScopeFilter,
    email: &str,
) -> Result<EmailAccount> {
    let account = state
        .accounts
        .find_by_email(email)
        .await?
        .ok_or_else(|| Error::EmailNotFound(email.to_string()))?;
    if !scope.contains(&account) {
        return Err(Error::EmailForbidden);
    }
    Ok(account)
}

/// Fetch-strategy hint from the account's group
async fn strategy_for(state: &AppState, account: &EmailAccount) -> Result<FetchStrategy> {
    match account.group_id {
        Some(group_id) => Ok(state
            .groups
            .get(group_id)
            .await?
            .map(|group| group.strategy())
            .unwrap_or(FetchStrategy::GraphFirst)),
        None => Ok(FetchStrategy::GraphFirst),
    }
}

async fn fetch_for(
    state: &AppState,
    ctx: &ApiKeyContext,
    params: &MailParams,
    limit: Option<usize>,
) -> Result<(EmailAccount, MailFolder, FetchOutcome)> {
    let email = required(&params.email, "email")?;
    let scope = ScopeFilter::for_key(&ctx.key);
    let account = visible_account(state, &scope, email).await?;
    let folder = MailFolder::parse(params.mailbox.as_deref());
    let strategy = strategy_for(state, &account).await?;
    let outcome = state
        .orchestrator
        .fetch(&account, folder, limit, &params.proxy(), strategy)
        .await?;
    Ok((account, folder, outcome))
}

fn mail_response(
    request_id: &str,
    account: &EmailAccount,
    folder: MailFolder,
    outcome: &FetchOutcome,
) -> Response {
    let response = ok_response(
        request_id,
        json!({
            "email": &account.email,
            "mailbox": folder,
            "count": outcome.messages.len(),
            "messages": &outcome.messages,
            "method": outcome.method,
        }),
    );
    with_mailbox(response, account.id)
}

/// `POST /api/get-email` - hand out a fresh mailbox from the pool
pub async fn get_email(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<ApiKeyContext>,
    Params(params): Params<GroupParams>,
) -> Response {
    let result = async {
        let scope = ScopeFilter::for_key(&ctx.key);
        let group = state
            .allocator
            .resolve_group(&scope, params.group.as_deref())
            .await?;
        state
            .allocator
            .allocate_and_mark(ctx.key.id, &scope, group.as_ref())
            .await
    }
    .await;

    match result {
        Ok(account) => with_mailbox(
            ok_response(
                &request_id.0,
                json!({ "email": &account.email, "id": account.id }),
            ),
            account.id,
        ),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `POST /api/mail_new` - latest messages for a named mailbox
pub async fn mail_new(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<ApiKeyContext>,
    Params(params): Params<MailParams>,
) -> Response {
    match fetch_for(&state, &ctx, &params, None).await {
        Ok((account, folder, outcome)) => mail_response(&request_id.0, &account, folder, &outcome),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `POST /api/mail_all` - all messages, bounded only by the page cap
pub async fn mail_all(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<ApiKeyContext>,
    Params(params): Params<MailParams>,
) -> Response {
    match fetch_for(&state, &ctx, &params, Some(UNBOUNDED_LIMIT)).await {
        Ok((account, folder, outcome)) => mail_response(&request_id.0, &account, folder, &outcome),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// Matched group, first capture, or the full text body
fn extract_text(messages: &[MailMessage], pattern: Option<&str>) -> Result<String> {
    let message = messages
        .first()
        .ok_or_else(|| Error::NotFound("no messages in mailbox".to_string()))?;

    let pattern = match pattern.map(str::trim).filter(|p| !p.is_empty()) {
        Some(pattern) => pattern,
        None => return Ok(message.text.clone()),
    };

    let regex = Regex::new(pattern)
        .map_err(|e| Error::Validation(format!("invalid match pattern: {e}")))?;

    match regex.captures(&message.text) {
        Some(captures) => {
            let matched = captures
                .get(1)
                .or_else(|| captures.get(0))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Ok(matched)
        }
        None => Ok(message.text.clone()),
    }
}

/// `GET /api/mail_text` - plain-text body extraction
pub async fn mail_text(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<ApiKeyContext>,
    Params(params): Params<MailTextParams>,
) -> Response {
    let result = async {
        let mail = MailParams {
            email: params.email.clone(),
            ..Default::default()
        };
        let (account, _, outcome) = fetch_for(&state, &ctx, &mail, None).await?;
        let text = extract_text(&outcome.messages, params.pattern.as_deref())?;
        Ok::<_, Error>((account.id, text))
    }
    .await;

    match result {
        Ok((account_id, text)) => with_mailbox(plain_ok(&request_id.0, text), account_id),
        Err(e) => plain_error(&request_id.0, &e),
    }
}

/// `POST /api/process-mailbox` - clear a folder
pub async fn process_mailbox(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<ApiKeyContext>,
    Params(params): Params<MailParams>,
) -> Response {
    let result = async {
        let email = required(&params.email, "email")?;
        let scope = ScopeFilter::for_key(&ctx.key);
        let account = visible_account(&state, &scope, email).await?;
        let folder = MailFolder::parse(params.mailbox.as_deref());
        let outcome = state
            .orchestrator
            .clear(&account, folder, &params.proxy())
            .await?;
        Ok::<_, Error>((account, folder, outcome))
    }
    .await;

    match result {
        Ok((account, folder, outcome)) => with_mailbox(
            ok_response(
                &request_id.0,
                json!({
                    "email": &account.email,
                    "mailbox": folder,
                    "status": outcome.status,
                    "deletedCount": outcome.deleted_count,
                }),
            ),
            account.id,
        ),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `GET /api/list-emails` - mailboxes visible to the credential
pub async fn list_emails(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<ApiKeyContext>,
    Params(params): Params<GroupParams>,
) -> Response {
    let result = async {
        let scope = ScopeFilter::for_key(&ctx.key);
        let group = state
            .allocator
            .resolve_group(&scope, params.group.as_deref())
            .await?;
        let accounts = state
            .accounts
            .list_in_scope(group.as_ref().map(|g| g.id), scope.group_ids(), scope.email_ids())
            .await?;
        let groups = state.groups.list().await?;

        let emails: Vec<_> = accounts
            .iter()
            .map(|account| {
                let group_name = account.group_id.and_then(|group_id| {
                    groups
                        .iter()
                        .find(|g| g.id == group_id)
                        .map(|g| g.name.clone())
                });
                json!({
                    "email": &account.email,
                    "status": &account.status,
                    "group": group_name,
                })
            })
            .collect();
        Ok::<_, Error>(json!({ "total": emails.len(), "emails": emails }))
    }
    .await;

    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `GET /api/pool-stats`
pub async fn pool_stats(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<ApiKeyContext>,
    Params(params): Params<GroupParams>,
) -> Response {
    let result = async {
        let scope = ScopeFilter::for_key(&ctx.key);
        let group = state
            .allocator
            .resolve_group(&scope, params.group.as_deref())
            .await?;
        state.allocator.stats(ctx.key.id, &scope, group.as_ref()).await
    }
    .await;

    match result {
        Ok(stats) => ok_response(&request_id.0, stats),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `POST /api/reset-pool` - release this credential's assignments
pub async fn reset_pool(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<ApiKeyContext>,
    Params(params): Params<GroupParams>,
) -> Response {
    let result = async {
        let scope = ScopeFilter::for_key(&ctx.key);
        let group = state
            .allocator
            .resolve_group(&scope, params.group.as_deref())
            .await?;
        state.allocator.reset(ctx.key.id, &scope, group.as_ref()).await
    }
    .await;

    match result {
        Ok(released) => ok_response(
            &request_id.0,
            json!({ "message": format!("pool reset, {released} assignment(s) released") }),
        ),
        Err(e) => error_response(&request_id.0, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> MailMessage {
        MailMessage {
            id: "m1".into(),
            from: "sender@example.com".into(),
            subject: "code".into(),
            text: text.into(),
            html: String::new(),
            date: None,
        }
    }

    #[test]
    fn extract_whole_match() {
        let messages = vec![message("Your code is 482913 — do not share")];
        let text = extract_text(&messages, Some(r"\d{6}")).unwrap();
        assert_eq!(text, "482913");
    }

    #[test]
    fn extract_prefers_first_capture_group() {
        let messages = vec![message("Your code is 482913 — do not share")];
        let text = extract_text(&messages, Some(r"code is (\d+)")).unwrap();
        assert_eq!(text, "482913");
    }

    #[test]
    fn no_pattern_returns_full_body() {
        let messages = vec![message("full body here")];
        assert_eq!(extract_text(&messages, None).unwrap(), "full body here");
    }

    #[test]
    fn unmatched_pattern_falls_back_to_body() {
        let messages = vec![message("nothing numeric")];
        assert_eq!(
            extract_text(&messages, Some(r"\d{6}")).unwrap(),
            "nothing numeric"
        );
    }

    #[test]
    fn invalid_pattern_is_a_validation_error() {
        let messages = vec![message("body")];
        assert!(matches!(
            extract_text(&messages, Some("(unclosed")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn empty_mailbox_is_not_found() {
        assert!(matches!(
            extract_text(&[], Some(r"\d")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn required_rejects_blank_values() {
        assert!(required(&Some("  ".into()), "email").is_err());
        assert!(required(&None, "email").is_err());
        assert_eq!(required(&Some(" a@x ".into()), "email").unwrap(), "a@x");
    }
}
