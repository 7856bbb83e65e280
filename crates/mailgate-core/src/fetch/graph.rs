//! Microsoft Graph mail client

use chrono::{DateTime, Utc};
use mailgate_common::types::MailFolder;
use mailgate_common::{Error, Result};
use serde::Deserialize;
use tracing::debug;

use super::MailMessage;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Deserialize)]
struct GraphListResponse {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    from: Option<GraphRecipient>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body_preview: Option<String>,
    #[serde(default)]
    body: Option<GraphBody>,
    #[serde(default)]
    received_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphBody {
    #[serde(default)]
    content: Option<String>,
}

impl GraphMessage {
    fn into_mail_message(self) -> MailMessage {
        let date = self
            .received_date_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        MailMessage {
            id: self.id,
            from: self
                .from
                .and_then(|f| f.email_address)
                .and_then(|a| a.address)
                .unwrap_or_default(),
            subject: self.subject.unwrap_or_default(),
            text: self.body_preview.unwrap_or_default(),
            html: self.body.and_then(|b| b.content).unwrap_or_default(),
            date,
        }
    }
}

/// List messages in a folder, most recent first
pub async fn list_messages(
    client: &reqwest::Client,
    access_token: &str,
    folder: MailFolder,
    limit: usize,
) -> Result<Vec<MailMessage>> {
    let url = format!(
        "{}/me/mailFolders/{}/messages",
        GRAPH_BASE,
        folder.graph_name()
    );

    let response = client
        .get(&url)
        .bearer_auth(access_token)
        .query(&[
            ("$top", limit.to_string()),
            ("$orderby", "receivedDateTime desc".to_string()),
        ])
        .send()
        .await
        .map_err(|e| Error::GraphApiFailed(format!("request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::GraphApiFailed(format!("status {status}: {body}")));
    }

    let parsed: GraphListResponse = response
        .json()
        .await
        .map_err(|e| Error::GraphApiFailed(format!("unreadable response: {e}")))?;

    debug!(folder = folder.graph_name(), count = parsed.value.len(), "graph list");

    Ok(parsed
        .value
        .into_iter()
        .map(GraphMessage::into_mail_message)
        .collect())
}

/// Delete one message. Callers treat failures as best-effort.
pub async fn delete_message(
    client: &reqwest::Client,
    access_token: &str,
    message_id: &str,
) -> Result<()> {
    let url = format!("{}/me/messages/{}", GRAPH_BASE, message_id);

    let response = client
        .delete(&url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| Error::GraphApiFailed(format!("delete failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        return Err(Error::GraphApiFailed(format!("delete status {status}")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_projection() {
        let raw = serde_json::json!({
            "id": "AAMk123",
            "from": {"emailAddress": {"address": "sender@example.com", "name": "Sender"}},
            "subject": "Your code",
            "bodyPreview": "Your code is 482913",
            "body": {"contentType": "html", "content": "<p>Your code is 482913</p>"},
            "receivedDateTime": "2024-05-01T10:30:00Z"
        });
        let message: GraphMessage = serde_json::from_value(raw).unwrap();
        let mail = message.into_mail_message();
        assert_eq!(mail.id, "AAMk123");
        assert_eq!(mail.from, "sender@example.com");
        assert_eq!(mail.subject, "Your code");
        assert_eq!(mail.text, "Your code is 482913");
        assert!(mail.html.contains("<p>"));
        assert_eq!(mail.date.unwrap().timestamp(), 1_714_559_400);
    }

    #[test]
    fn missing_fields_project_to_defaults() {
        let raw = serde_json::json!({"id": "X"});
        let message: GraphMessage = serde_json::from_value(raw).unwrap();
        let mail = message.into_mail_message();
        assert_eq!(mail.from, "");
        assert_eq!(mail.subject, "");
        assert_eq!(mail.text, "");
        assert!(mail.date.is_none());
    }

    #[test]
    fn list_response_tolerates_empty_value() {
        let parsed: GraphListResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.value.is_empty());
    }
}
