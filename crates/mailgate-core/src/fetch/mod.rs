//! Mail fetching: OAuth broker, Graph and IMAP clients, orchestration

pub mod bulk_delete;
pub mod graph;
pub mod imap;
pub mod oauth;
pub mod orchestrator;
pub mod proxy;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Normalized message shape returned by both transports
#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub id: String,
    pub from: String,
    pub subject: String,
    /// Plain-text body (Graph: bodyPreview)
    pub text: String,
    /// HTML body when present
    pub html: String,
    pub date: Option<DateTime<Utc>>,
}
