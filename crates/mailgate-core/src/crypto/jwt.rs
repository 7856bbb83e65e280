//! Session token minting and verification

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mailgate_common::types::AdminUserId;
use mailgate_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Claims embedded in an admin session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Admin user id
    pub sub: AdminUserId,
    pub username: String,
    pub role: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// HMAC-signed session token issuer
#[derive(Clone)]
pub struct JwtIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_secs: u64,
}

impl JwtIssuer {
    /// Build an issuer; the secret must be at least 32 bytes
    pub fn new(secret: &str, lifetime_secs: u64) -> Result<Self> {
        if secret.len() < 32 {
            return Err(Error::Config(
                "JWT secret must be at least 32 bytes".to_string(),
            ));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime_secs,
        })
    }

    /// Mint a token for an authenticated admin
    pub fn mint(&self, id: AdminUserId, username: &str, role: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sub: id,
            username: username.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + self.lifetime_secs as i64,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("Token minting failed: {}", e)))
    }

    /// Verify a token, rejecting bad signatures and expired claims
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| Error::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn rejects_short_secret() {
        assert!(JwtIssuer::new("short", 7200).is_err());
    }

    #[test]
    fn mint_and_verify() {
        let issuer = JwtIssuer::new(SECRET, 7200).unwrap();
        let token = issuer.mint(42, "root", "super_admin").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.username, "root");
        assert_eq!(claims.role, "super_admin");
        assert!(claims.exp - claims.iat == 7200);
    }

    #[test]
    fn rejects_expired_token() {
        let issuer = JwtIssuer::new(SECRET, 7200).unwrap();
        let stale = chrono::Utc::now().timestamp() - 3600;
        let claims = SessionClaims {
            sub: 1,
            username: "root".to_string(),
            role: "admin".to_string(),
            iat: stale - 7200,
            exp: stale,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(issuer.verify(&token), Err(Error::InvalidToken)));
    }

    #[test]
    fn rejects_foreign_signature() {
        let issuer = JwtIssuer::new(SECRET, 7200).unwrap();
        let other = JwtIssuer::new("ffffffffffffffffffffffffffffffff", 7200).unwrap();
        let token = issuer.mint(1, "root", "admin").unwrap();
        assert!(matches!(other.verify(&token), Err(Error::InvalidToken)));
    }

    #[test]
    fn rejects_garbage() {
        let issuer = JwtIssuer::new(SECRET, 7200).unwrap();
        assert!(issuer.verify("not-a-token").is_err());
        assert!(issuer.verify("").is_err());
    }
}
