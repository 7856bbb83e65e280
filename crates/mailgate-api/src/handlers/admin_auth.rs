//! Admin authentication handlers
//!
//! Login validates password, lock-out state and (when enabled) TOTP, then
//! mints a session token. The 2FA lifecycle is
//! disabled -> pending (setup) -> enabled (confirm), and pending setups are
//! discarded on logout or a fresh setup.

use axum::extract::{FromRequest, Request, State};
use axum::response::Response;
use axum::Extension;
use mailgate_common::{Error, Result};
use mailgate_core::crypto::totp;
use mailgate_core::verify_password;
use mailgate_storage::models::AdminUser;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{client_ip, AdminContext};
use crate::envelope::{error_response, ok_response, RequestId};
use crate::params::Params;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    pub username: Option<String>,
    pub password: Option<String>,
    pub otp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OtpParams {
    pub otp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DisableParams {
    pub password: Option<String>,
    pub otp: Option<String>,
}

fn admin_json(admin: &AdminUser) -> serde_json::Value {
    json!({
        "id": admin.id,
        "username": &admin.username,
        "email": &admin.email,
        "role": &admin.role,
        "enabled": admin.enabled,
        "totpEnabled": admin.totp_enabled,
        "lastLoginAt": admin.last_login_at,
    })
}

/// Check a presented OTP against the admin's own secret or the legacy
/// instance-wide secret.
fn verify_admin_otp(state: &AppState, admin: &AdminUser, otp: &str) -> Result<bool> {
    let window = state.config.admin_2fa_window;
    if admin.totp_enabled {
        let secret_enc = admin
            .totp_secret_enc
            .as_deref()
            .ok_or(Error::TwoFactorSecretInvalid)?;
        let secret = state.secret_box.decrypt(secret_enc)?;
        return totp::verify_code(&secret, otp, window);
    }
    if let Some(legacy) = &state.config.admin_2fa_secret {
        return totp::verify_code(legacy, otp, window);
    }
    Ok(false)
}

fn requires_otp(state: &AppState, admin: &AdminUser) -> bool {
    admin.totp_enabled || state.config.admin_2fa_secret.is_some()
}

/// `POST /admin/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    request: Request,
) -> Response {
    let ip = client_ip(&request);
    let Params(params) = match Params::<LoginParams>::from_request(request, &state).await {
        Ok(params) => params,
        Err(rejection) => return rejection,
    };

    let result = login_inner(&state, params, ip.as_deref()).await;
    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}

async fn login_inner(
    state: &AppState,
    params: LoginParams,
    ip: Option<&str>,
) -> Result<serde_json::Value> {
    let username = params
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::Validation("username is required".to_string()))?;
    let password = params
        .password
        .as_deref()
        .ok_or_else(|| Error::Validation("password is required".to_string()))?;

    // While locked, the password is not even checked
    state.lockout.check(username, ip).await?;

    let admin = match state.admins.find_by_username(username).await? {
        Some(admin) if admin.enabled => admin,
        Some(_) => return Err(Error::AccountDisabled),
        None => {
            state.lockout.record_failure(username, ip).await?;
            return Err(Error::InvalidCredentials);
        }
    };

    if !verify_password(password, &admin.password_hash) {
        state.lockout.record_failure(username, ip).await?;
        return Err(Error::InvalidCredentials);
    }

    if requires_otp(state, &admin) {
        let otp = match params.otp.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            Some(otp) => otp,
            // The password was right; tell the client to prompt for a code
            None => return Err(Error::InvalidOtp),
        };
        if !verify_admin_otp(state, &admin, otp)? {
            state.lockout.record_failure(username, ip).await?;
            return Err(Error::InvalidOtp);
        }
    }

    state.lockout.clear(username, ip).await?;
    state
        .admins
        .record_login(admin.id, ip.unwrap_or("unknown"))
        .await?;

    let token = state.jwt.mint(admin.id, &admin.username, &admin.role)?;
    info!(username = admin.username.as_str(), "admin logged in");

    Ok(json!({ "token": token, "admin": admin_json(&admin) }))
}

/// `POST /admin/auth/logout` - discards any unconfirmed 2FA setup
pub async fn logout(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<AdminContext>,
) -> Response {
    match state.admins.clear_pending_totp(ctx.admin.id).await {
        Ok(()) => ok_response(&request_id.0, json!({ "message": "logged out" })),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `GET /admin/auth/profile`
pub async fn profile(
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<AdminContext>,
) -> Response {
    ok_response(&request_id.0, admin_json(&ctx.admin))
}

/// `POST /admin/auth/2fa/setup` - issue a pending secret
pub async fn twofa_setup(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<AdminContext>,
) -> Response {
    let result = async {
        let secret = totp::generate_secret();
        let url = totp::otpauth_url(&secret, "Mailgate", &ctx.admin.username)?;
        let secret_enc = state.secret_box.encrypt(&secret)?;
        state.admins.set_pending_totp(ctx.admin.id, &secret_enc).await?;
        Ok::<_, Error>(json!({ "secret": secret, "otpauthUrl": url }))
    }
    .await;

    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `POST /admin/auth/2fa/enable` - confirm the pending secret
pub async fn twofa_enable(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<AdminContext>,
    Params(params): Params<OtpParams>,
) -> Response {
    let result = async {
        let otp = params
            .otp
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or(Error::InvalidOtp)?;
        let pending_enc = ctx
            .admin
            .totp_pending_secret_enc
            .as_deref()
            .ok_or_else(|| Error::Validation("no pending 2FA setup".to_string()))?;
        let pending = state.secret_box.decrypt(pending_enc)?;
        if !totp::verify_code(&pending, otp, state.config.admin_2fa_window)? {
            return Err(Error::InvalidOtp);
        }
        if !state.admins.enable_totp(ctx.admin.id).await? {
            return Err(Error::Validation("no pending 2FA setup".to_string()));
        }
        Ok::<_, Error>(json!({ "message": "two-factor authentication enabled" }))
    }
    .await;

    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}

/// `POST /admin/auth/2fa/disable` - requires password plus a valid code
pub async fn twofa_disable(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(ctx): Extension<AdminContext>,
    Params(params): Params<DisableParams>,
) -> Response {
    let result = async {
        let password = params
            .password
            .as_deref()
            .ok_or_else(|| Error::Validation("password is required".to_string()))?;
        if !verify_password(password, &ctx.admin.password_hash) {
            return Err(Error::InvalidCredentials);
        }
        if !ctx.admin.totp_enabled {
            return Err(Error::Validation("two-factor is not enabled".to_string()));
        }
        let otp = params
            .otp
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or(Error::InvalidOtp)?;
        if !verify_admin_otp(&state, &ctx.admin, otp)? {
            return Err(Error::InvalidOtp);
        }
        state.admins.disable_totp(ctx.admin.id).await?;
        Ok::<_, Error>(json!({ "message": "two-factor authentication disabled" }))
    }
    .await;

    match result {
        Ok(data) => ok_response(&request_id.0, data),
        Err(e) => error_response(&request_id.0, &e),
    }
}
