//! Permission evaluation for external API actions
//!
//! A credential optionally carries a sparse `{action: bool}` map. An absent
//! or empty map allows everything; a present map denies anything it does
//! not explicitly allow.

use serde::{Deserialize, Serialize};

/// Closed set of external API actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    GetEmail,
    MailNew,
    MailText,
    MailAll,
    ProcessMailbox,
    ListEmails,
    PoolStats,
    PoolReset,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::GetEmail => "get_email",
            ActionKind::MailNew => "mail_new",
            ActionKind::MailText => "mail_text",
            ActionKind::MailAll => "mail_all",
            ActionKind::ProcessMailbox => "process_mailbox",
            ActionKind::ListEmails => "list_emails",
            ActionKind::PoolStats => "pool_stats",
            ActionKind::PoolReset => "pool_reset",
        }
    }

    /// Parse an action key, accepting hyphenated aliases
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_action(raw).as_str() {
            "get_email" => Some(ActionKind::GetEmail),
            "mail_new" => Some(ActionKind::MailNew),
            "mail_text" => Some(ActionKind::MailText),
            "mail_all" => Some(ActionKind::MailAll),
            "process_mailbox" => Some(ActionKind::ProcessMailbox),
            "list_emails" => Some(ActionKind::ListEmails),
            "pool_stats" => Some(ActionKind::PoolStats),
            "pool_reset" => Some(ActionKind::PoolReset),
            _ => None,
        }
    }

    pub fn all() -> [ActionKind; 8] {
        [
            ActionKind::GetEmail,
            ActionKind::MailNew,
            ActionKind::MailText,
            ActionKind::MailAll,
            ActionKind::ProcessMailbox,
            ActionKind::ListEmails,
            ActionKind::PoolStats,
            ActionKind::PoolReset,
        ]
    }
}

/// Trim, lower-case, and fold hyphens to underscores
pub fn normalize_action(raw: &str) -> String {
    raw.trim().to_lowercase().replace('-', "_")
}

const WILDCARDS: [&str; 3] = ["*", "all", "__all__"];

/// Decide whether a permission map allows an action. First match wins:
/// absent/empty map allows; a true wildcard allows; then the normalized
/// key, then its hyphenated alias; anything else is denied.
pub fn is_allowed(permissions: Option<&serde_json::Value>, action: ActionKind) -> bool {
    let map = match permissions.and_then(|value| value.as_object()) {
        Some(map) if !map.is_empty() => map,
        _ => return true,
    };

    for wildcard in WILDCARDS {
        if map.get(wildcard).and_then(|v| v.as_bool()) == Some(true) {
            return true;
        }
    }

    let key = action.as_str();
    if let Some(flag) = map.get(key).and_then(|v| v.as_bool()) {
        return flag;
    }

    let hyphenated = key.replace('_', "-");
    if let Some(flag) = map.get(&hyphenated).and_then(|v| v.as_bool()) {
        return flag;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_or_empty_map_allows() {
        assert!(is_allowed(None, ActionKind::GetEmail));
        assert!(is_allowed(Some(&json!({})), ActionKind::MailNew));
        assert!(is_allowed(Some(&json!(null)), ActionKind::MailNew));
    }

    #[test]
    fn wildcard_allows_everything() {
        for wildcard in ["*", "all", "__all__"] {
            let map = json!({ wildcard: true, "get_email": false });
            assert!(is_allowed(Some(&map), ActionKind::GetEmail));
        }
        // A false wildcard grants nothing
        let map = json!({ "*": false, "mail_new": true });
        assert!(is_allowed(Some(&map), ActionKind::MailNew));
        assert!(!is_allowed(Some(&map), ActionKind::MailAll));
    }

    #[test]
    fn explicit_entries_win() {
        let map = json!({ "get_email": true, "mail_new": false });
        assert!(is_allowed(Some(&map), ActionKind::GetEmail));
        assert!(!is_allowed(Some(&map), ActionKind::MailNew));
        // Unlisted actions are denied once a map exists
        assert!(!is_allowed(Some(&map), ActionKind::PoolStats));
    }

    #[test]
    fn hyphenated_aliases_resolve() {
        let map = json!({ "get-email": true });
        assert!(is_allowed(Some(&map), ActionKind::GetEmail));
        let map = json!({ "process-mailbox": false, "mail_text": true });
        assert!(!is_allowed(Some(&map), ActionKind::ProcessMailbox));
        assert!(is_allowed(Some(&map), ActionKind::MailText));
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [" Get-Email ", "get_email", "GET-EMAIL"] {
            assert_eq!(normalize_action(raw), "get_email");
            assert_eq!(normalize_action(&normalize_action(raw)), "get_email");
            assert_eq!(ActionKind::parse(raw), Some(ActionKind::GetEmail));
        }
    }

    #[test]
    fn unknown_keys_do_not_parse() {
        assert_eq!(ActionKind::parse("send_mail"), None);
        assert_eq!(ActionKind::parse(""), None);
    }
}
