//! Application state shared across handlers

use std::sync::Arc;

use mailgate_common::Config;
use mailgate_core::{
    JwtIssuer, LoginLockout, MailOrchestrator, PoolAllocator, RateLimiterBackend, RequestLogger,
    SecretBox, TokenBroker,
};
use mailgate_storage::repository::{
    AdminUserRepository, ApiKeyRepository, ApiLogRepository, EmailAccountRepository,
    EmailGroupRepository, EmailUsageRepository,
};
use mailgate_storage::{DatabasePool, KvStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabasePool,
    pub kv: KvStore,
    pub secret_box: SecretBox,
    pub jwt: JwtIssuer,
    pub rate_limiter: Arc<dyn RateLimiterBackend>,
    pub lockout: LoginLockout,
    pub allocator: PoolAllocator,
    pub orchestrator: MailOrchestrator,
    pub logger: RequestLogger,

    pub api_keys: ApiKeyRepository,
    pub accounts: EmailAccountRepository,
    pub groups: EmailGroupRepository,
    pub usages: EmailUsageRepository,
    pub admins: AdminUserRepository,
    pub api_logs: ApiLogRepository,
}

impl AppState {
    /// Wire every service from its dependencies
    pub fn new(
        config: Config,
        db: DatabasePool,
        kv: KvStore,
        rate_limiter: Arc<dyn RateLimiterBackend>,
    ) -> mailgate_common::Result<Self> {
        let secret_box = SecretBox::new(&config.encryption_key);
        let jwt = JwtIssuer::new(&config.jwt_secret, config.jwt_expires_secs)?;
        let lockout = LoginLockout::new(
            kv.clone(),
            config.admin_login_max_attempts,
            config.admin_login_lock_minutes,
        );

        let api_keys = ApiKeyRepository::new(db.clone());
        let accounts = EmailAccountRepository::new(db.clone());
        let groups = EmailGroupRepository::new(db.clone());
        let usages = EmailUsageRepository::new(db.clone());
        let admins = AdminUserRepository::new(db.clone());
        let api_logs = ApiLogRepository::new(db.clone());

        let allocator = PoolAllocator::new(accounts.clone(), usages.clone(), groups.clone());
        let orchestrator = MailOrchestrator::new(
            TokenBroker::new(kv.clone()),
            accounts.clone(),
            secret_box.clone(),
        );
        let logger = RequestLogger::new(api_logs.clone());

        Ok(Self {
            config: Arc::new(config),
            db,
            kv,
            secret_box,
            jwt,
            rate_limiter,
            lockout,
            allocator,
            orchestrator,
            logger,
            api_keys,
            accounts,
            groups,
            usages,
            admins,
            api_logs,
        })
    }
}
