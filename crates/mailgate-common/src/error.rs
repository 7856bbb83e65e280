//! Error types for Mailgate

use thiserror::Error;

/// Main error type for Mailgate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Validation failures carrying per-field details
    #[error("Validation error")]
    ValidationDetails(Vec<(String, String)>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("API key is disabled")]
    ApiKeyDisabled,

    #[error("API key has expired")]
    ApiKeyExpired,

    #[error("Invalid one-time password")]
    InvalidOtp,

    #[error("Account locked, try again in {0} minute(s)")]
    AccountLocked(u64),

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Group is not within the credential scope")]
    GroupForbidden,

    #[error("Mailbox is not within the credential scope")]
    EmailForbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Mailbox not found: {0}")]
    EmailNotFound(String),

    #[error("Mailbox address already exists: {0}")]
    DuplicateEmail(String),

    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    #[error("Group already exists: {0}")]
    GroupExists(String),

    #[error("Mailbox already assigned to this credential")]
    AlreadyUsed,

    #[error("Allocation retries exhausted, try again")]
    ConcurrencyLimit,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("No unused mailbox available")]
    NoUnusedEmail,

    #[error("Failed to obtain IMAP access token")]
    ImapTokenFailed,

    #[error("Graph API request failed: {0}")]
    GraphApiFailed(String),

    #[error("Ciphertext is malformed or does not authenticate")]
    CryptoInvalid,

    #[error("Stored 2FA secret is invalid")]
    TwoFactorSecretInvalid,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Mailgate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Validation(_) | Error::ValidationDetails(_) => 400,
            Error::Unauthorized(_)
            | Error::InvalidCredentials
            | Error::InvalidToken
            | Error::InvalidApiKey => 401,
            Error::InvalidOtp => 401,
            Error::AccountLocked(_) => 429,
            Error::AccountDisabled | Error::ApiKeyDisabled | Error::ApiKeyExpired => 403,
            Error::Forbidden(_) | Error::GroupForbidden | Error::EmailForbidden => 403,
            Error::NotFound(_) | Error::GroupNotFound(_) | Error::EmailNotFound(_) => 404,
            Error::DuplicateEmail(_) | Error::DuplicateUsername(_) | Error::GroupExists(_) => 409,
            Error::AlreadyUsed => 409,
            Error::ConcurrencyLimit | Error::RateLimitExceeded => 429,
            Error::NoUnusedEmail => 400,
            Error::ImapTokenFailed | Error::GraphApiFailed(_) => 500,
            Error::CryptoInvalid | Error::TwoFactorSecretInvalid => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Returns the error code string used in API envelopes
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Validation(_) | Error::ValidationDetails(_) => "VALIDATION_ERROR",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::InvalidCredentials => "INVALID_CREDENTIALS",
            Error::InvalidToken => "INVALID_TOKEN",
            Error::InvalidApiKey => "INVALID_API_KEY",
            Error::ApiKeyDisabled => "API_KEY_DISABLED",
            Error::ApiKeyExpired => "API_KEY_EXPIRED",
            Error::InvalidOtp => "INVALID_OTP",
            Error::AccountLocked(_) => "ACCOUNT_LOCKED",
            Error::AccountDisabled => "ACCOUNT_DISABLED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::GroupForbidden => "GROUP_FORBIDDEN",
            Error::EmailForbidden => "EMAIL_FORBIDDEN",
            Error::NotFound(_) => "NOT_FOUND",
            Error::GroupNotFound(_) => "GROUP_NOT_FOUND",
            Error::EmailNotFound(_) => "EMAIL_NOT_FOUND",
            Error::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            Error::DuplicateUsername(_) => "DUPLICATE_USERNAME",
            Error::GroupExists(_) => "GROUP_EXISTS",
            Error::AlreadyUsed => "ALREADY_USED",
            Error::ConcurrencyLimit => "CONCURRENCY_LIMIT",
            Error::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Error::NoUnusedEmail => "NO_UNUSED_EMAIL",
            Error::ImapTokenFailed => "IMAP_TOKEN_FAILED",
            Error::GraphApiFailed(_) => "GRAPH_API_FAILED",
            Error::CryptoInvalid => "CRYPTO_INVALID",
            Error::TwoFactorSecretInvalid => "TWO_FACTOR_SECRET_INVALID",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Per-field validation details, when present
    pub fn details(&self) -> Option<&[(String, String)]> {
        match self {
            Error::ValidationDetails(details) => Some(details),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_api_contract() {
        assert_eq!(Error::InvalidApiKey.status_code(), 401);
        assert_eq!(Error::ApiKeyDisabled.status_code(), 403);
        assert_eq!(Error::GroupForbidden.status_code(), 403);
        assert_eq!(Error::AlreadyUsed.status_code(), 409);
        assert_eq!(Error::ConcurrencyLimit.status_code(), 429);
        assert_eq!(Error::RateLimitExceeded.status_code(), 429);
        assert_eq!(Error::AccountLocked(3).status_code(), 429);
        assert_eq!(Error::NoUnusedEmail.status_code(), 400);
        assert_eq!(Error::ImapTokenFailed.status_code(), 500);
    }

    #[test]
    fn codes_are_screaming_snake() {
        for err in [
            Error::InvalidApiKey,
            Error::RateLimitExceeded,
            Error::GroupForbidden,
            Error::AlreadyUsed,
        ] {
            let code = err.code();
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn locked_message_carries_minutes() {
        let err = Error::AccountLocked(12);
        assert!(err.to_string().contains("12 minute"));
    }
}
