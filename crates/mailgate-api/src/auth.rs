//! Authentication middleware and request plumbing
//!
//! External requests resolve an API key (header, bearer token or query
//! parameter), pass the rate limiter and the per-action permission check,
//! and carry the credential in request extensions. Admin requests resolve
//! a session token instead. The outermost layer assigns request ids; the
//! api-log layer records every terminal external response.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use mailgate_common::{Error, Result};
use mailgate_core::{is_allowed, synth_request_id, ActionKind};
use mailgate_storage::models::{AdminUser, ApiKey};
use mailgate_storage::repository::NewApiLog;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use crate::envelope::{error_response, LoggedMailbox, RequestId, REQUEST_ID_HEADER};
use crate::state::AppState;

/// Authenticated credential attached to external requests
#[derive(Debug, Clone)]
pub struct ApiKeyContext {
    pub key: Arc<ApiKey>,
    pub action: ActionKind,
}

/// Authenticated admin attached to admin requests
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub admin: Arc<AdminUser>,
}

impl AdminContext {
    pub fn is_super_admin(&self) -> bool {
        self.admin.role == "super_admin"
    }
}

/// Post-authentication super-admin gate
pub fn require_super_admin(ctx: &AdminContext) -> Result<()> {
    if ctx.is_super_admin() {
        Ok(())
    } else {
        Err(Error::Forbidden("super admin role required".to_string()))
    }
}

/// Best-effort client address from proxy headers
pub fn client_ip(request: &Request) -> Option<String> {
    let headers = request.headers();
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next().map(str::trim).filter(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Outermost layer: adopt the inbound `x-request-id` or synthesize one,
/// and echo it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(synth_request_id);

    request.extensions_mut().insert(RequestId(request_id.clone()));
    let mut response = next.run(request).await;

    if !response.headers().contains_key(REQUEST_ID_HEADER) {
        if let Ok(value) = request_id.parse() {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
    }
    response
}

/// Derive the external action key from the request path
fn action_from_path(path: &str) -> Option<ActionKind> {
    let name = path.strip_prefix("/api/").unwrap_or(path).trim_matches('/');
    // Route names map to action keys through the same normalization the
    // permission map uses (`pool-reset` is keyed `pool_reset`)
    match name {
        "reset-pool" => Some(ActionKind::PoolReset),
        other => ActionKind::parse(other),
    }
}

/// Extract the presented API key secret, in priority order
fn extract_api_key(request: &Request) -> Option<String> {
    if let Some(key) = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
    {
        if !key.trim().is_empty() {
            return Some(key.trim().to_string());
        }
    }

    if let Some(auth) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if token.starts_with("sk_") {
                return Some(token.trim().to_string());
            }
        }
    }

    request.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            (name == "api_key" && !value.is_empty()).then(|| value.to_string())
        })
    })
}

/// SHA-256 hex digest of the raw secret
pub fn hash_api_key(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

async fn authenticate_api_key(state: &AppState, secret: Option<String>) -> Result<Arc<ApiKey>> {
    let secret = secret.ok_or(Error::InvalidApiKey)?;
    let digest = hash_api_key(&secret);

    let key = state
        .api_keys
        .find_by_hash(&digest)
        .await?
        .ok_or(Error::InvalidApiKey)?;

    if !key.enabled {
        return Err(Error::ApiKeyDisabled);
    }
    if key.is_expired() {
        return Err(Error::ApiKeyExpired);
    }

    state
        .rate_limiter
        .hit(key.id, key.rate_limit_per_minute.max(0) as u32)
        .await?;

    // Usage bookkeeping must not delay or fail the request
    let repo = state.api_keys.clone();
    let key_id = key.id;
    tokio::spawn(async move {
        if let Err(e) = repo.record_usage(key_id).await {
            error!(key_id, error = %e, "failed to record api key usage");
        }
    });

    Ok(Arc::new(key))
}

/// Credential resolution for `/api` routes
pub async fn api_key_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let action = match action_from_path(request.uri().path()) {
        Some(action) => action,
        None => {
            return error_response(
                &request_id,
                &Error::NotFound(request.uri().path().to_string()),
            )
        }
    };

    let key = match authenticate_api_key(&state, &request).await {
        Ok(key) => key,
        Err(e) => {
            warn!(path = request.uri().path(), error = %e, "api authentication failed");
            return error_response(&request_id, &e);
        }
    };

    if !is_allowed(key.permissions.as_ref(), action) {
        return error_response(
            &request_id,
            &Error::Forbidden(format!("action {} not permitted", action.as_str())),
        );
    }

    debug!(key_id = key.id, action = action.as_str(), "api key authenticated");
    let context = ApiKeyContext {
        key: key.clone(),
        action,
    };
    request.extensions_mut().insert(context.clone());
    let mut response = next.run(request).await;
    // Surface the credential to the api-log layer sitting outside
    response.extensions_mut().insert(context);
    response
}

/// One api-log record per terminal external response
pub async fn api_log_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_string();
    let action = action_from_path(&path)
        .map(|a| a.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let ip = client_ip(&request).unwrap_or_else(|| "unknown".to_string());
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(request).await;

    // Absent context means authentication never completed
    let api_key_id = response
        .extensions()
        .get::<ApiKeyContext>()
        .map(|ctx| ctx.key.id);
    let email_account_id = response
        .extensions()
        .get::<LoggedMailbox>()
        .map(|logged| logged.0);

    state
        .logger
        .log(NewApiLog {
            action,
            api_key_id,
            email_account_id,
            client_ip: ip,
            status_code: response.status().as_u16() as i32,
            elapsed_ms: started.elapsed().as_millis() as i64,
            metadata: json!({ "request_id": request_id }),
        })
        .await;

    response
}

fn extract_bearer_or_cookie_token(request: &Request) -> Option<String> {
    if let Some(auth) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                let (name, value) = cookie.trim().split_once('=')?;
                (name == "token").then(|| value.to_string())
            })
        })
}

/// Session-token resolution for `/admin` routes
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let claims = match extract_bearer_or_cookie_token(&request)
        .ok_or(Error::InvalidToken)
        .and_then(|token| state.jwt.verify(&token))
    {
        Ok(claims) => claims,
        Err(e) => return error_response(&request_id, &e),
    };

    let admin = match state.admins.get(claims.sub).await {
        Ok(Some(admin)) if admin.enabled => admin,
        Ok(Some(_)) => return error_response(&request_id, &Error::AccountDisabled),
        Ok(None) => return error_response(&request_id, &Error::InvalidToken),
        Err(e) => return error_response(&request_id, &e),
    };

    request.extensions_mut().insert(AdminContext {
        admin: Arc::new(admin),
    });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(headers: &[(&str, &str)], uri: &str) -> Request {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn api_key_extraction_priority() {
        // Header wins over bearer and query
        let request = request_with(
            &[
                ("x-api-key", "sk_header"),
                ("authorization", "Bearer sk_bearer"),
            ],
            "/api/pool-stats?api_key=sk_query",
        );
        assert_eq!(extract_api_key(&request).as_deref(), Some("sk_header"));

        // Bearer requires the sk_ prefix
        let request = request_with(&[("authorization", "Bearer sk_bearer")], "/api/pool-stats");
        assert_eq!(extract_api_key(&request).as_deref(), Some("sk_bearer"));
        let request = request_with(&[("authorization", "Bearer jwt-token")], "/api/pool-stats");
        assert_eq!(extract_api_key(&request), None);

        // Query parameter is the last resort
        let request = request_with(&[], "/api/pool-stats?api_key=sk_query");
        assert_eq!(extract_api_key(&request).as_deref(), Some("sk_query"));
    }

    #[test]
    fn digest_is_sha256_hex() {
        let digest = hash_api_key("sk_test");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_api_key("sk_test"));
        assert_ne!(digest, hash_api_key("sk_other"));
    }

    #[test]
    fn actions_derive_from_paths() {
        assert_eq!(action_from_path("/api/get-email"), Some(ActionKind::GetEmail));
        assert_eq!(action_from_path("/api/mail_new"), Some(ActionKind::MailNew));
        assert_eq!(action_from_path("/api/mail_text"), Some(ActionKind::MailText));
        assert_eq!(action_from_path("/api/mail_all"), Some(ActionKind::MailAll));
        assert_eq!(
            action_from_path("/api/process-mailbox"),
            Some(ActionKind::ProcessMailbox)
        );
        assert_eq!(
            action_from_path("/api/list-emails"),
            Some(ActionKind::ListEmails)
        );
        assert_eq!(action_from_path("/api/pool-stats"), Some(ActionKind::PoolStats));
        assert_eq!(action_from_path("/api/reset-pool"), Some(ActionKind::PoolReset));
        assert_eq!(action_from_path("/api/unknown"), None);
    }

    #[test]
    fn session_token_from_cookie() {
        let request = request_with(&[("cookie", "theme=dark; token=abc.def.ghi")], "/admin/x");
        assert_eq!(
            extract_bearer_or_cookie_token(&request).as_deref(),
            Some("abc.def.ghi")
        );
        let request = request_with(&[("authorization", "Bearer jwt")], "/admin/x");
        assert_eq!(extract_bearer_or_cookie_token(&request).as_deref(), Some("jwt"));
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let request = request_with(
            &[("x-forwarded-for", "1.2.3.4, 10.0.0.1"), ("x-real-ip", "9.9.9.9")],
            "/api/pool-stats",
        );
        assert_eq!(client_ip(&request).as_deref(), Some("1.2.3.4"));
        let request = request_with(&[("x-real-ip", "9.9.9.9")], "/api/pool-stats");
        assert_eq!(client_ip(&request).as_deref(), Some("9.9.9.9"));
        let request = request_with(&[], "/api/pool-stats");
        assert_eq!(client_ip(&request), None);
    }
}
