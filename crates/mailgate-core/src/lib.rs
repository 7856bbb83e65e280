//! Mailgate Core - mail-fetching engine and credential plumbing
//!
//! This crate implements the gateway's moving parts: sealed secrets,
//! password and TOTP verification, session tokens, rate limiting and
//! login lock-out, permission and scope evaluation, the pool allocator,
//! the Graph/IMAP fetch engine, and request-log retention.

pub mod access;
pub mod audit;
pub mod crypto;
pub mod fetch;
pub mod limits;
pub mod pool;

pub use access::permissions::{is_allowed, normalize_action, ActionKind};
pub use access::scope::ScopeFilter;
pub use audit::logger::{synth_request_id, RequestLogger};
pub use audit::retention::LogRetentionJob;
pub use crypto::jwt::{JwtIssuer, SessionClaims};
pub use crypto::password::{hash_password, verify_password};
pub use crypto::secret_box::SecretBox;
pub use fetch::oauth::TokenBroker;
pub use fetch::orchestrator::{ClearOutcome, FetchOutcome, MailOrchestrator};
pub use fetch::proxy::ProxyConfig;
pub use fetch::MailMessage;
pub use limits::lockout::LoginLockout;
pub use limits::rate_limiter::{MemoryRateLimiter, RateLimiterBackend, SharedRateLimiter};
pub use pool::allocator::{PoolAllocator, PoolStats};
