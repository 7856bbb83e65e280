//! Graph-first / IMAP-fallback fetch orchestration
//!
//! Every fetch resolves credentials through the secret box, asks the token
//! broker for transport tokens, and records the outcome on the mailbox
//! row: `active` with a fresh check timestamp on success, `error` with the
//! message on failure.

use mailgate_common::types::{AccountStatus, FetchMethod, FetchStrategy, MailFolder};
use mailgate_common::{Error, Result};
use mailgate_storage::models::EmailAccount;
use mailgate_storage::repository::EmailAccountRepository;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::bulk_delete::{delete_batch, DELETE_CONCURRENCY};
use super::graph;
use super::imap;
use super::oauth::{MailboxCredentials, TokenBroker};
use super::proxy::{build_client, ProxyConfig};
use super::MailMessage;
use crate::crypto::secret_box::SecretBox;

/// Default message count for "latest" fetches
pub const DEFAULT_FETCH_LIMIT: usize = 10;
/// Page size for unbounded fetches and clearing
const PAGE_SIZE: usize = 500;
/// Upper bound on pages walked while clearing a folder
const MAX_CLEAR_PAGES: usize = 10;

/// Result of a fetch, tagged with the transport that produced it
#[derive(Debug)]
pub struct FetchOutcome {
    pub messages: Vec<MailMessage>,
    pub method: FetchMethod,
}

/// Result of clearing a folder
#[derive(Debug, Serialize)]
pub struct ClearOutcome {
    pub deleted_count: usize,
    pub status: &'static str,
}

/// Mail fetch orchestrator
#[derive(Clone)]
pub struct MailOrchestrator {
    broker: TokenBroker,
    accounts: EmailAccountRepository,
    secret_box: SecretBox,
}

impl MailOrchestrator {
    pub fn new(
        broker: TokenBroker,
        accounts: EmailAccountRepository,
        secret_box: SecretBox,
    ) -> Self {
        Self {
            broker,
            accounts,
            secret_box,
        }
    }

    /// Fetch messages honoring the group's strategy hint. Status and
    /// last-check bookkeeping happen here, atomically per outcome.
    pub async fn fetch(
        &self,
        account: &EmailAccount,
        folder: MailFolder,
        limit: Option<usize>,
        proxy: &ProxyConfig,
        strategy: FetchStrategy,
    ) -> Result<FetchOutcome> {
        let refresh_token = self.secret_box.decrypt(&account.refresh_token_enc)?;
        let creds = MailboxCredentials {
            email: &account.email,
            client_id: &account.client_id,
            refresh_token: &refresh_token,
        };
        let limit = limit.unwrap_or(DEFAULT_FETCH_LIMIT).clamp(1, PAGE_SIZE);

        let outcome = match strategy {
            FetchStrategy::GraphOnly => self.try_graph(creds, folder, limit, proxy).await,
            FetchStrategy::ImapOnly => self.try_imap(creds, folder, limit, proxy).await,
            FetchStrategy::GraphFirst => match self.try_graph(creds, folder, limit, proxy).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    debug!(email = account.email.as_str(), error = %e, "graph path failed, degrading to imap");
                    self.try_imap(creds, folder, limit, proxy).await
                }
            },
            FetchStrategy::ImapFirst => match self.try_imap(creds, folder, limit, proxy).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    debug!(email = account.email.as_str(), error = %e, "imap path failed, degrading to graph");
                    self.try_graph(creds, folder, limit, proxy).await
                }
            },
        };

        match outcome {
            Ok(outcome) => {
                self.accounts
                    .mark_status(account.id, AccountStatus::Active, None)
                    .await?;
                Ok(outcome)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(mark_err) = self
                    .accounts
                    .mark_status(account.id, AccountStatus::Error, Some(&message))
                    .await
                {
                    warn!(email = account.email.as_str(), error = %mark_err, "failed to record fetch error");
                }
                Err(e)
            }
        }
    }

    async fn try_graph(
        &self,
        creds: MailboxCredentials<'_>,
        folder: MailFolder,
        limit: usize,
        proxy: &ProxyConfig,
    ) -> Result<FetchOutcome> {
        let token = self
            .broker
            .graph_token(creds, proxy)
            .await?
            .ok_or_else(|| Error::GraphApiFailed("no Mail.Read token available".to_string()))?;
        let client = build_client(proxy)?;
        let messages = graph::list_messages(&client, &token, folder, limit).await?;
        Ok(FetchOutcome {
            messages,
            method: FetchMethod::GraphApi,
        })
    }

    async fn try_imap(
        &self,
        creds: MailboxCredentials<'_>,
        folder: MailFolder,
        limit: usize,
        proxy: &ProxyConfig,
    ) -> Result<FetchOutcome> {
        let token = self
            .broker
            .imap_token(creds, proxy)
            .await?
            .ok_or(Error::ImapTokenFailed)?;
        let messages = imap::fetch_messages(creds.email, &token, folder, limit).await?;
        Ok(FetchOutcome {
            messages,
            method: FetchMethod::Imap,
        })
    }

    /// Delete everything in a folder via Graph, paging with bounded
    /// per-page delete concurrency. Partial progress is reported with
    /// status `error` instead of being discarded.
    pub async fn clear(
        &self,
        account: &EmailAccount,
        folder: MailFolder,
        proxy: &ProxyConfig,
    ) -> Result<ClearOutcome> {
        let refresh_token = self.secret_box.decrypt(&account.refresh_token_enc)?;
        let creds = MailboxCredentials {
            email: &account.email,
            client_id: &account.client_id,
            refresh_token: &refresh_token,
        };

        let Some(token) = self.broker.graph_token(creds, proxy).await? else {
            self.accounts
                .mark_status(
                    account.id,
                    AccountStatus::Error,
                    Some("no Mail.Read token available"),
                )
                .await?;
            return Ok(ClearOutcome {
                deleted_count: 0,
                status: "error",
            });
        };

        let client = Arc::new(build_client(proxy)?);
        let mut deleted_count = 0usize;
        let mut status = "success";

        for _page in 0..MAX_CLEAR_PAGES {
            let page = match graph::list_messages(&client, &token, folder, PAGE_SIZE).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(email = account.email.as_str(), error = %e, "clear paging failed");
                    status = "error";
                    break;
                }
            };
            if page.is_empty() {
                break;
            }

            let ids: Vec<String> = page.into_iter().map(|m| m.id).collect();
            let page_len = ids.len();
            let client = client.clone();
            let token = token.clone();
            let deleted = delete_batch(ids, DELETE_CONCURRENCY, move |id| {
                let client = client.clone();
                let token = token.clone();
                async move { graph::delete_message(&client, &token, &id).await }
            })
            .await;
            deleted_count += deleted;

            if page_len < PAGE_SIZE {
                break;
            }
        }

        let (account_status, error) = if status == "success" {
            (AccountStatus::Active, None)
        } else {
            (AccountStatus::Error, Some("folder clear failed"))
        };
        self.accounts
            .mark_status(account.id, account_status, error)
            .await?;

        Ok(ClearOutcome {
            deleted_count,
            status,
        })
    }
}
