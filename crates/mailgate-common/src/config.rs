//! Environment-driven configuration for Mailgate
//!
//! All knobs come from the process environment. `Config::from_env` collects
//! every violation and reports them together so operators can fix a broken
//! deployment in one pass.

use std::collections::HashMap;

use crate::{Error, Result};

/// Default admin password seeded on first start. Rejected in production.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

const BASE32_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value {
            "production" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    /// Session token lifetime in seconds
    pub jwt_expires_secs: u64,
    /// 32-character key string; hashed once into the AEAD key
    pub encryption_key: String,
    pub admin_username: String,
    pub admin_password: String,
    pub admin_login_max_attempts: u32,
    pub admin_login_lock_minutes: u64,
    /// Legacy instance-wide 2FA secret (base32), if configured
    pub admin_2fa_secret: Option<String>,
    /// Symmetric TOTP verification window in 30-second steps
    pub admin_2fa_window: u8,
    pub api_log_retention_days: i64,
    pub api_log_cleanup_interval_minutes: u64,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load and validate configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load from an explicit variable map; used by `from_env` and tests
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut violations: Vec<(String, String)> = Vec::new();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let environment = Environment::parse(get("NODE_ENV").unwrap_or("development"));

        let port = match get("PORT").unwrap_or("3000").parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                violations.push(("PORT".into(), "must be a valid port number".into()));
                0
            }
        };

        let database_url = match get("DATABASE_URL") {
            Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {
                url.to_string()
            }
            Some(_) => {
                violations.push(("DATABASE_URL".into(), "must be a postgres:// URL".into()));
                String::new()
            }
            None => {
                violations.push(("DATABASE_URL".into(), "is required".into()));
                String::new()
            }
        };

        let redis_url = get("REDIS_URL").map(String::from);
        if let Some(url) = &redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                violations.push(("REDIS_URL".into(), "must be a redis:// URL".into()));
            }
        }

        let jwt_secret = get("JWT_SECRET").unwrap_or_default().to_string();
        if jwt_secret.len() < 32 {
            violations.push(("JWT_SECRET".into(), "must be at least 32 characters".into()));
        }

        let jwt_expires_secs = match get("JWT_EXPIRES_IN") {
            Some(raw) => match parse_duration_secs(raw) {
                Some(secs) => secs,
                None => {
                    violations.push((
                        "JWT_EXPIRES_IN".into(),
                        "must be a duration like 7200, 120m or 2h".into(),
                    ));
                    0
                }
            },
            None => 2 * 60 * 60,
        };

        let encryption_key = get("ENCRYPTION_KEY").unwrap_or_default().to_string();
        if encryption_key.chars().count() != 32 {
            violations.push(("ENCRYPTION_KEY".into(), "must be exactly 32 characters".into()));
        }

        let admin_username = get("ADMIN_USERNAME").unwrap_or("admin").to_string();
        let admin_password = get("ADMIN_PASSWORD")
            .unwrap_or(DEFAULT_ADMIN_PASSWORD)
            .to_string();
        if environment == Environment::Production && admin_password == DEFAULT_ADMIN_PASSWORD {
            violations.push((
                "ADMIN_PASSWORD".into(),
                "default admin password is not allowed in production".into(),
            ));
        }

        let admin_login_max_attempts =
            match get("ADMIN_LOGIN_MAX_ATTEMPTS").unwrap_or("5").parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    violations.push((
                        "ADMIN_LOGIN_MAX_ATTEMPTS".into(),
                        "must be a positive integer".into(),
                    ));
                    0
                }
            };

        let admin_login_lock_minutes =
            match get("ADMIN_LOGIN_LOCK_MINUTES").unwrap_or("15").parse::<u64>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    violations.push((
                        "ADMIN_LOGIN_LOCK_MINUTES".into(),
                        "must be a positive integer".into(),
                    ));
                    0
                }
            };

        let admin_2fa_secret = get("ADMIN_2FA_SECRET").map(str::to_uppercase);
        if let Some(secret) = &admin_2fa_secret {
            let valid_base32 = secret.chars().all(|c| BASE32_ALPHABET.contains(c));
            if secret.len() < 16 || !valid_base32 {
                violations.push((
                    "ADMIN_2FA_SECRET".into(),
                    "must be at least 16 base32 characters".into(),
                ));
            }
        }

        let admin_2fa_window = match get("ADMIN_2FA_WINDOW").unwrap_or("1").parse::<u8>() {
            Ok(w) if w <= 5 => w,
            _ => {
                violations.push(("ADMIN_2FA_WINDOW".into(), "must be between 0 and 5".into()));
                0
            }
        };

        let api_log_retention_days =
            match get("API_LOG_RETENTION_DAYS").unwrap_or("30").parse::<i64>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    violations.push((
                        "API_LOG_RETENTION_DAYS".into(),
                        "must be a positive integer".into(),
                    ));
                    0
                }
            };

        let api_log_cleanup_interval_minutes = match get("API_LOG_CLEANUP_INTERVAL_MINUTES")
            .unwrap_or("60")
            .parse::<u64>()
        {
            Ok(n) if n >= 1 => n,
            _ => {
                violations.push((
                    "API_LOG_CLEANUP_INTERVAL_MINUTES".into(),
                    "must be a positive integer".into(),
                ));
                0
            }
        };

        let cors_origins = get("CORS_ORIGIN")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if !violations.is_empty() {
            return Err(Error::ValidationDetails(violations));
        }

        Ok(Config {
            environment,
            port,
            database_url,
            redis_url,
            jwt_secret,
            jwt_expires_secs,
            encryption_key,
            admin_username,
            admin_password,
            admin_login_max_attempts,
            admin_login_lock_minutes,
            admin_2fa_secret,
            admin_2fa_window,
            api_log_retention_days,
            api_log_cleanup_interval_minutes,
            cors_origins,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Parse `7200`, `45s`, `120m`, `2h` or `1d` into seconds
fn parse_duration_secs(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    let mut chars = raw.chars();
    let unit = chars.next_back()?;
    let value = chars.as_str().parse::<u64>().ok()?;
    match unit {
        's' => Some(value),
        'm' => Some(value * 60),
        'h' => Some(value * 60 * 60),
        'd' => Some(value * 24 * 60 * 60),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert(
            "DATABASE_URL".to_string(),
            "postgres://localhost/mailgate".to_string(),
        );
        vars.insert(
            "JWT_SECRET".to_string(),
            "0123456789abcdef0123456789abcdef".to_string(),
        );
        vars.insert(
            "ENCRYPTION_KEY".to_string(),
            "0123456789abcdef0123456789abcdef".to_string(),
        );
        vars
    }

    #[test]
    fn loads_with_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.jwt_expires_secs, 7200);
        assert_eq!(config.admin_login_max_attempts, 5);
        assert_eq!(config.admin_login_lock_minutes, 15);
        assert_eq!(config.api_log_retention_days, 30);
        assert_eq!(config.admin_2fa_window, 1);
        assert!(!config.is_production());
    }

    #[test]
    fn rejects_short_jwt_secret_and_bad_key_together() {
        let mut vars = base_vars();
        vars.insert("JWT_SECRET".to_string(), "short".to_string());
        vars.insert("ENCRYPTION_KEY".to_string(), "short".to_string());

        let err = Config::from_vars(&vars).unwrap_err();
        let details = match err {
            Error::ValidationDetails(details) => details,
            other => panic!("unexpected error: {other:?}"),
        };
        let fields: Vec<&str> = details.iter().map(|(field, _)| field.as_str()).collect();
        assert!(fields.contains(&"JWT_SECRET"));
        assert!(fields.contains(&"ENCRYPTION_KEY"));
    }

    #[test]
    fn rejects_default_admin_password_in_production() {
        let mut vars = base_vars();
        vars.insert("NODE_ENV".to_string(), "production".to_string());

        let err = Config::from_vars(&vars).unwrap_err();
        match err {
            Error::ValidationDetails(details) => {
                assert!(details.iter().any(|(field, _)| field == "ADMIN_PASSWORD"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn accepts_custom_admin_password_in_production() {
        let mut vars = base_vars();
        vars.insert("NODE_ENV".to_string(), "production".to_string());
        vars.insert("ADMIN_PASSWORD".to_string(), "s3cure-enough".to_string());
        assert!(Config::from_vars(&vars).is_ok());
    }

    #[test]
    fn parses_jwt_expiry_units() {
        assert_eq!(parse_duration_secs("7200"), Some(7200));
        assert_eq!(parse_duration_secs("2h"), Some(7200));
        assert_eq!(parse_duration_secs("120m"), Some(7200));
        assert_eq!(parse_duration_secs("1d"), Some(86400));
        assert_eq!(parse_duration_secs("nope"), None);
        // Multibyte trailing characters are a violation, not a panic
        assert_eq!(parse_duration_secs("2á"), None);
        assert_eq!(parse_duration_secs("á"), None);
        assert_eq!(parse_duration_secs(""), None);
    }

    #[test]
    fn validates_2fa_secret_shape() {
        let mut vars = base_vars();
        vars.insert("ADMIN_2FA_SECRET".to_string(), "tooshort".to_string());
        assert!(Config::from_vars(&vars).is_err());

        let mut vars = base_vars();
        vars.insert(
            "ADMIN_2FA_SECRET".to_string(),
            "jbswy3dpehpk3pxp".to_string(),
        );
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.admin_2fa_secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn splits_cors_origins() {
        let mut vars = base_vars();
        vars.insert(
            "CORS_ORIGIN".to_string(),
            "https://a.example, https://b.example".to_string(),
        );
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.cors_origins[1], "https://b.example");
    }
}
