//! Exactly-once mailbox allocation
//!
//! The unique primary key on `email_usages(api_key_id, email_account_id)`
//! is the sole arbiter of exclusivity. Allocation races surface as a
//! conflict on the insert; retrying a bounded number of times resolves
//! them without locks.

use mailgate_common::types::{ApiKeyId, EmailAccountId};
use mailgate_common::{Error, Result};
use mailgate_storage::models::{EmailAccount, EmailGroup};
use mailgate_storage::repository::{
    EmailAccountRepository, EmailGroupRepository, EmailUsageRepository,
};
use serde::Serialize;
use tracing::debug;

use crate::access::scope::ScopeFilter;

const ALLOCATE_ATTEMPTS: usize = 3;

/// Pool statistics for one credential
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStats {
    pub total: i64,
    pub used: i64,
    pub remaining: i64,
}

/// Pool allocation service
#[derive(Clone)]
pub struct PoolAllocator {
    accounts: EmailAccountRepository,
    usages: EmailUsageRepository,
    groups: EmailGroupRepository,
}

impl PoolAllocator {
    pub fn new(
        accounts: EmailAccountRepository,
        usages: EmailUsageRepository,
        groups: EmailGroupRepository,
    ) -> Self {
        Self {
            accounts,
            usages,
            groups,
        }
    }

    /// Resolve an optional group name, enforcing the scope allow-list
    pub async fn resolve_group(
        &self,
        scope: &ScopeFilter,
        name: Option<&str>,
    ) -> Result<Option<EmailGroup>> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => return Ok(None),
        };
        let group = self
            .groups
            .find_by_name(name)
            .await?
            .ok_or_else(|| Error::GroupNotFound(name.to_string()))?;
        scope.check_group(group.id)?;
        Ok(Some(group))
    }

    /// Lowest-id unused mailbox in scope, or `None` when exhausted
    pub async fn allocate(
        &self,
        api_key_id: ApiKeyId,
        scope: &ScopeFilter,
        group: Option<&EmailGroup>,
    ) -> Result<Option<EmailAccount>> {
        self.accounts
            .allocate_candidate(
                api_key_id,
                group.map(|g| g.id),
                scope.group_ids(),
                scope.email_ids(),
            )
            .await
    }

    /// Record the assignment; a primary-key conflict means another caller
    /// won the race for this mailbox.
    pub async fn mark_used(&self, api_key_id: ApiKeyId, account_id: EmailAccountId) -> Result<()> {
        if self.usages.insert(api_key_id, account_id).await? {
            Ok(())
        } else {
            Err(Error::AlreadyUsed)
        }
    }

    /// Allocate-and-mark with the bounded retry loop used by the external
    /// route: lost races pick the next candidate, up to three attempts.
    pub async fn allocate_and_mark(
        &self,
        api_key_id: ApiKeyId,
        scope: &ScopeFilter,
        group: Option<&EmailGroup>,
    ) -> Result<EmailAccount> {
        for attempt in 1..=ALLOCATE_ATTEMPTS {
            let candidate = match self.allocate(api_key_id, scope, group).await? {
                Some(account) => account,
                None => return Err(Error::NoUnusedEmail),
            };
            match self.mark_used(api_key_id, candidate.id).await {
                Ok(()) => return Ok(candidate),
                Err(Error::AlreadyUsed) => {
                    debug!(api_key_id, account_id = candidate.id, attempt, "allocation race lost");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(Error::ConcurrencyLimit)
    }

    /// Remove assignments within the scope and optional group filter
    pub async fn reset(
        &self,
        api_key_id: ApiKeyId,
        scope: &ScopeFilter,
        group: Option<&EmailGroup>,
    ) -> Result<u64> {
        self.usages
            .delete_for_key(
                api_key_id,
                group.map(|g| g.id),
                scope.group_ids(),
                scope.email_ids(),
            )
            .await
    }

    /// Pool statistics for one credential
    pub async fn stats(
        &self,
        api_key_id: ApiKeyId,
        scope: &ScopeFilter,
        group: Option<&EmailGroup>,
    ) -> Result<PoolStats> {
        let group_id = group.map(|g| g.id);
        let total = self
            .accounts
            .count_in_scope(group_id, scope.group_ids(), scope.email_ids())
            .await?;
        let used = self
            .usages
            .count_for_key(api_key_id, group_id, scope.group_ids(), scope.email_ids())
            .await?;
        Ok(PoolStats {
            total,
            used,
            remaining: (total - used).max(0),
        })
    }

    /// Replace the assignment set for one credential. Every supplied id
    /// must exist and be visible through the scope.
    pub async fn update_pool(
        &self,
        api_key_id: ApiKeyId,
        scope: &ScopeFilter,
        account_ids: &[EmailAccountId],
    ) -> Result<()> {
        let found = self.accounts.list_by_ids(account_ids).await?;
        for id in account_ids {
            let account = found
                .iter()
                .find(|a| a.id == *id)
                .ok_or_else(|| Error::EmailNotFound(id.to_string()))?;
            if !scope.contains(account) {
                return Err(Error::EmailForbidden);
            }
        }
        self.usages.replace_for_key(api_key_id, account_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_never_report_negative_remaining() {
        // A shrunken pool can leave more assignments than visible boxes
        let stats = PoolStats {
            total: 2,
            used: 5,
            remaining: (2i64 - 5).max(0),
        };
        assert_eq!(stats.remaining, 0);
    }
}
