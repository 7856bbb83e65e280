//! Common types for Mailgate

use serde::{Deserialize, Serialize};

/// Unique identifier for API keys (credentials)
pub type ApiKeyId = i64;

/// Unique identifier for mailbox accounts
pub type EmailAccountId = i64;

/// Unique identifier for mailbox groups
pub type EmailGroupId = i64;

/// Unique identifier for admin users
pub type AdminUserId = i64;

/// Unique identifier for API log records
pub type ApiLogId = i64;

/// Lifecycle status of a mailbox account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Error,
    Disabled,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Error => "error",
            AccountStatus::Disabled => "disabled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(AccountStatus::Active),
            "error" => Some(AccountStatus::Error),
            "disabled" => Some(AccountStatus::Disabled),
            _ => None,
        }
    }
}

/// Per-group preference for how mail is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    GraphFirst,
    ImapFirst,
    GraphOnly,
    ImapOnly,
}

impl FetchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategy::GraphFirst => "graph_first",
            FetchStrategy::ImapFirst => "imap_first",
            FetchStrategy::GraphOnly => "graph_only",
            FetchStrategy::ImapOnly => "imap_only",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "graph_first" => Some(FetchStrategy::GraphFirst),
            "imap_first" => Some(FetchStrategy::ImapFirst),
            "graph_only" => Some(FetchStrategy::GraphOnly),
            "imap_only" => Some(FetchStrategy::ImapOnly),
            _ => None,
        }
    }
}

/// Role of an admin user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    Admin,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::SuperAdmin => "super_admin",
            AdminRole::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "super_admin" => Some(AdminRole::SuperAdmin),
            "admin" => Some(AdminRole::Admin),
            _ => None,
        }
    }
}

/// Folder selector accepted by the external API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailFolder {
    #[default]
    Inbox,
    Junk,
}

impl MailFolder {
    /// Parse the external `mailbox` parameter; defaults to inbox
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("junk") => MailFolder::Junk,
            _ => MailFolder::Inbox,
        }
    }

    /// Graph mail-folder alias
    pub fn graph_name(&self) -> &'static str {
        match self {
            MailFolder::Inbox => "inbox",
            MailFolder::Junk => "junkemail",
        }
    }

    /// IMAP mailbox name, passed verbatim to SELECT
    pub fn imap_name(&self) -> &'static str {
        match self {
            MailFolder::Inbox => "INBOX",
            MailFolder::Junk => "Junk",
        }
    }
}

/// Transport used to retrieve messages, reported in responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMethod {
    #[serde(rename = "graph_api")]
    GraphApi,
    #[serde(rename = "imap")]
    Imap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_parse_defaults_to_inbox() {
        assert_eq!(MailFolder::parse(None), MailFolder::Inbox);
        assert_eq!(MailFolder::parse(Some("inbox")), MailFolder::Inbox);
        assert_eq!(MailFolder::parse(Some("JUNK")), MailFolder::Junk);
        assert_eq!(MailFolder::parse(Some("anything")), MailFolder::Inbox);
    }

    #[test]
    fn folder_aliases() {
        assert_eq!(MailFolder::Junk.graph_name(), "junkemail");
        assert_eq!(MailFolder::Junk.imap_name(), "Junk");
        assert_eq!(MailFolder::Inbox.graph_name(), "inbox");
    }

    #[test]
    fn fetch_method_serializes_to_wire_names() {
        assert_eq!(
            serde_json::to_string(&FetchMethod::GraphApi).unwrap(),
            "\"graph_api\""
        );
        assert_eq!(serde_json::to_string(&FetchMethod::Imap).unwrap(), "\"imap\"");
    }
}
