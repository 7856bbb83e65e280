//! Repositories, one per aggregate

pub mod admin_users;
pub mod api_keys;
pub mod api_logs;
pub mod email_accounts;
pub mod email_groups;
pub mod email_usages;

pub use admin_users::AdminUserRepository;
pub use api_keys::{ApiKeyRepository, NewApiKey, UpdateApiKey};
pub use api_logs::{ApiLogFilter, ApiLogRepository, NewApiLog};
pub use email_accounts::{EmailAccountRepository, NewEmailAccount, UpdateEmailAccount};
pub use email_groups::EmailGroupRepository;
pub use email_usages::EmailUsageRepository;

pub(crate) fn db_err(err: sqlx::Error) -> mailgate_common::Error {
    mailgate_common::Error::Database(err.to_string())
}
