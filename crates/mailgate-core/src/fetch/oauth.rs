//! OAuth refresh-token exchange with scope-aware caching
//!
//! Access tokens are cached in the shared store under two distinct keys:
//! `graph_token:{address}` only when the returned scope string grants
//! Mail.Read, and `imap_token:{address}` for scopeless exchanges used by
//! XOAUTH2. A failed exchange yields `None` so callers can degrade.

use std::time::Duration;

use mailgate_common::Result;
use mailgate_storage::KvStore;
use serde::Deserialize;
use tracing::{debug, warn};

use super::proxy::{build_client, ProxyConfig};

const TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const GRAPH_MAIL_READ: &str = "https://graph.microsoft.com/Mail.Read";
/// Refresh slack subtracted from `expires_in` before caching
const TTL_SLACK_SECS: u64 = 60;

/// Plain credentials for one mailbox, decrypted by the caller
#[derive(Debug, Clone, Copy)]
pub struct MailboxCredentials<'a> {
    pub email: &'a str,
    pub client_id: &'a str,
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    #[serde(default)]
    scope: String,
}

/// Refresh-token to access-token broker
#[derive(Clone)]
pub struct TokenBroker {
    kv: KvStore,
    token_url: String,
}

impl TokenBroker {
    pub fn new(kv: KvStore) -> Self {
        Self {
            kv,
            token_url: TOKEN_URL.to_string(),
        }
    }

    /// Override the token endpoint; used by tests
    pub fn with_token_url(kv: KvStore, token_url: String) -> Self {
        Self { kv, token_url }
    }

    /// Access token usable against the Graph mail API. `None` when the
    /// exchange fails or the account's consent lacks Mail.Read.
    pub async fn graph_token(
        &self,
        creds: MailboxCredentials<'_>,
        proxy: &ProxyConfig,
    ) -> Result<Option<String>> {
        let cache_key = format!("graph_token:{}", creds.email);
        if let Some(token) = self.kv.get(&cache_key).await? {
            return Ok(Some(token));
        }

        let Some((token, expires_in, scope)) =
            self.exchange(creds, Some(GRAPH_MAIL_READ), proxy).await?
        else {
            return Ok(None);
        };

        if !scope.contains(GRAPH_MAIL_READ) {
            debug!(email = creds.email, "token scope lacks Mail.Read, not caching");
            return Ok(None);
        }

        self.cache(&cache_key, &token, expires_in).await;
        Ok(Some(token))
    }

    /// Access token for IMAP XOAUTH2, from a scopeless exchange
    pub async fn imap_token(
        &self,
        creds: MailboxCredentials<'_>,
        proxy: &ProxyConfig,
    ) -> Result<Option<String>> {
        let cache_key = format!("imap_token:{}", creds.email);
        if let Some(token) = self.kv.get(&cache_key).await? {
            return Ok(Some(token));
        }

        let Some((token, expires_in, _)) = self.exchange(creds, None, proxy).await? else {
            return Ok(None);
        };

        self.cache(&cache_key, &token, expires_in).await;
        Ok(Some(token))
    }

    /// One form-encoded exchange against the consumers token endpoint.
    /// Network and upstream errors come back as `None`; the caller decides
    /// how to degrade.
    async fn exchange(
        &self,
        creds: MailboxCredentials<'_>,
        scope: Option<&str>,
        proxy: &ProxyConfig,
    ) -> Result<Option<(String, u64, String)>> {
        let client = build_client(proxy)?;

        let mut form = vec![
            ("client_id", creds.client_id),
            ("refresh_token", creds.refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(scope) = scope {
            form.push(("scope", scope));
        }

        let response = match client.post(&self.token_url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(email = creds.email, error = %e, "token exchange request failed");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                email = creds.email,
                %status,
                body = body.as_str(),
                "token exchange rejected"
            );
            return Ok(None);
        }

        let parsed: TokenResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(email = creds.email, error = %e, "token response unreadable");
                return Ok(None);
            }
        };

        match parsed.access_token {
            Some(token) => Ok(Some((
                token,
                parsed.expires_in.unwrap_or(TTL_SLACK_SECS),
                parsed.scope,
            ))),
            None => Ok(None),
        }
    }

    async fn cache(&self, key: &str, token: &str, expires_in: u64) {
        let ttl = expires_in.saturating_sub(TTL_SLACK_SECS);
        if ttl == 0 {
            return;
        }
        // Cache misses are harmless; never fail a fetch over them
        if let Err(e) = self.kv.set_ex(key, token, Duration::from_secs(ttl)).await {
            warn!(key, error = %e, "token cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cached_graph_token_short_circuits() {
        let kv = KvStore::memory();
        kv.set_ex("graph_token:a@x", "cached", Duration::from_secs(60))
            .await
            .unwrap();
        // Unroutable endpoint proves no network call happens on a hit
        let broker = TokenBroker::with_token_url(kv, "http://127.0.0.1:1/token".into());
        let creds = MailboxCredentials {
            email: "a@x",
            client_id: "cid",
            refresh_token: "rt",
        };
        let token = broker
            .graph_token(creds, &ProxyConfig::default())
            .await
            .unwrap();
        assert_eq!(token.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn failed_exchange_degrades_to_none() {
        let broker =
            TokenBroker::with_token_url(KvStore::memory(), "http://127.0.0.1:1/token".into());
        let creds = MailboxCredentials {
            email: "a@x",
            client_id: "cid",
            refresh_token: "rt",
        };
        let token = broker
            .imap_token(creds, &ProxyConfig::default())
            .await
            .unwrap();
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn expiring_tokens_are_not_cached() {
        let kv = KvStore::memory();
        let broker = TokenBroker::new(kv.clone());
        broker.cache("graph_token:a@x", "tok", 30).await;
        assert_eq!(kv.get("graph_token:a@x").await.unwrap(), None);
        broker.cache("graph_token:a@x", "tok", 3600).await;
        assert_eq!(
            kv.get("graph_token:a@x").await.unwrap().as_deref(),
            Some("tok")
        );
    }
}
