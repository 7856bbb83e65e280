//! HTTP handlers

pub mod admin_auth;
pub mod admins;
pub mod api_keys;
pub mod api_logs;
pub mod dashboard;
pub mod email_accounts;
pub mod external;
pub mod groups;
pub mod health;
pub mod pool_admin;
