//! Credential scope resolution
//!
//! A credential may carry allow-lists of group ids and mailbox ids. The
//! `ScopeFilter` turns them into checks and query predicates so route
//! logic never builds SQL fragments itself.

use mailgate_common::types::{EmailAccountId, EmailGroupId};
use mailgate_common::{Error, Result};
use mailgate_storage::models::{ApiKey, EmailAccount};

/// Resolved allow-lists for one credential; `None` means unrestricted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    allowed_group_ids: Option<Vec<i64>>,
    allowed_email_ids: Option<Vec<i64>>,
}

impl ScopeFilter {
    /// Build the filter for a credential
    pub fn for_key(key: &ApiKey) -> Self {
        Self {
            allowed_group_ids: key.allowed_group_ids_vec(),
            allowed_email_ids: key.allowed_email_ids_vec(),
        }
    }

    pub fn new(groups: Option<Vec<i64>>, emails: Option<Vec<i64>>) -> Self {
        Self {
            allowed_group_ids: groups,
            allowed_email_ids: emails,
        }
    }

    /// Group-id predicate operand for repository queries
    pub fn group_ids(&self) -> Option<&[i64]> {
        self.allowed_group_ids.as_deref()
    }

    /// Mailbox-id predicate operand for repository queries
    pub fn email_ids(&self) -> Option<&[i64]> {
        self.allowed_email_ids.as_deref()
    }

    /// An explicitly requested group must sit inside the allow-list
    pub fn check_group(&self, group_id: EmailGroupId) -> Result<()> {
        match &self.allowed_group_ids {
            Some(allowed) if !allowed.contains(&group_id) => Err(Error::GroupForbidden),
            _ => Ok(()),
        }
    }

    /// A directly addressed mailbox id must sit inside the allow-list
    pub fn check_mailbox_id(&self, id: EmailAccountId) -> Result<()> {
        match &self.allowed_email_ids {
            Some(allowed) if !allowed.contains(&id) => Err(Error::EmailForbidden),
            _ => Ok(()),
        }
    }

    /// Whether a loaded account is visible through this scope
    pub fn contains(&self, account: &EmailAccount) -> bool {
        if let Some(groups) = &self.allowed_group_ids {
            match account.group_id {
                Some(group_id) if groups.contains(&group_id) => {}
                _ => return false,
            }
        }
        if let Some(emails) = &self.allowed_email_ids {
            if !emails.contains(&account.id) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(id: i64, group_id: Option<i64>) -> EmailAccount {
        EmailAccount {
            id,
            email: format!("a{id}@example.com"),
            client_id: "client".into(),
            refresh_token_enc: "enc".into(),
            password_enc: None,
            status: "active".into(),
            group_id,
            last_checked_at: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unrestricted_scope_allows_everything() {
        let scope = ScopeFilter::default();
        assert!(scope.check_group(9).is_ok());
        assert!(scope.check_mailbox_id(1234).is_ok());
        assert!(scope.contains(&account(1, None)));
    }

    #[test]
    fn requested_group_outside_allow_list_is_forbidden() {
        let scope = ScopeFilter::new(Some(vec![7]), None);
        assert!(scope.check_group(7).is_ok());
        assert!(matches!(scope.check_group(9), Err(Error::GroupForbidden)));
    }

    #[test]
    fn mailbox_allow_list_is_enforced() {
        let scope = ScopeFilter::new(None, Some(vec![1, 2]));
        assert!(scope.check_mailbox_id(2).is_ok());
        assert!(matches!(
            scope.check_mailbox_id(3),
            Err(Error::EmailForbidden)
        ));
    }

    #[test]
    fn contains_applies_both_lists() {
        let scope = ScopeFilter::new(Some(vec![7]), Some(vec![1]));
        assert!(scope.contains(&account(1, Some(7))));
        // Wrong group
        assert!(!scope.contains(&account(1, Some(8))));
        // Groupless account cannot satisfy a group allow-list
        assert!(!scope.contains(&account(1, None)));
        // Wrong id
        assert!(!scope.contains(&account(2, Some(7))));
    }

    #[test]
    fn predicate_operands_expose_lists() {
        let scope = ScopeFilter::new(Some(vec![1, 2]), None);
        assert_eq!(scope.group_ids(), Some(&[1, 2][..]));
        assert_eq!(scope.email_ids(), None);
    }
}
