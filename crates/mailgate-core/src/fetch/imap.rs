//! IMAP mail client for Outlook mailboxes
//!
//! Connects over TLS, binds with XOAUTH2, selects the folder read-only
//! and pulls the most recent UIDs. The connection lives inside one
//! deadline; dropping the stream closes it on every exit path.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use mail_parser::MessageParser;
use mailgate_common::types::MailFolder;
use mailgate_common::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::MailMessage;

const IMAP_HOST: &str = "outlook.office365.com";
const IMAP_PORT: u16 = 993;
const DEADLINE: Duration = Duration::from_secs(30);

/// SASL initial response for XOAUTH2
fn xoauth2_response(email: &str, access_token: &str) -> String {
    BASE64.encode(format!("user={}\x01auth=Bearer {}\x01\x01", email, access_token))
}

/// Fetch up to `limit` most recent messages from `folder`
pub async fn fetch_messages(
    email: &str,
    access_token: &str,
    folder: MailFolder,
    limit: usize,
) -> Result<Vec<MailMessage>> {
    tokio::time::timeout(
        DEADLINE,
        fetch_inner(email, access_token, folder, limit),
    )
    .await
    .map_err(|_| Error::Internal("IMAP operation timed out".to_string()))?
}

async fn fetch_inner(
    email: &str,
    access_token: &str,
    folder: MailFolder,
    limit: usize,
) -> Result<Vec<MailMessage>> {
    let mut conn = ImapConnection::connect().await?;

    conn.authenticate(email, access_token).await?;
    conn.examine(folder.imap_name()).await?;
    let uids = conn.search_all().await?;

    let start = uids.len().saturating_sub(limit);
    let recent = &uids[start..];
    debug!(email, folder = folder.imap_name(), total = uids.len(), fetching = recent.len(), "imap search");

    let now_ms = Utc::now().timestamp_millis();
    let mut messages = Vec::with_capacity(recent.len());
    for (seq, uid) in recent.iter().enumerate() {
        if let Some(raw) = conn.fetch_body(*uid).await? {
            messages.push(parse_message(&raw, now_ms, seq + 1));
        }
    }

    conn.logout().await;

    // Most recent first; undated messages sink to the end
    messages.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(messages)
}

/// Parse one RFC 5322 message into the normalized shape
fn parse_message(raw: &[u8], now_ms: i64, seq: usize) -> MailMessage {
    let parsed = MessageParser::default().parse(raw);
    let (from, subject, text, html, date) = match &parsed {
        Some(message) => (
            message
                .from()
                .and_then(|from| from.first())
                .and_then(|addr| addr.address())
                .unwrap_or_default()
                .to_string(),
            message.subject().unwrap_or_default().to_string(),
            message
                .body_text(0)
                .map(|body| body.to_string())
                .unwrap_or_default(),
            message
                .body_html(0)
                .map(|body| body.to_string())
                .unwrap_or_default(),
            message.date().and_then(|dt| to_chrono(dt.to_timestamp())),
        ),
        None => Default::default(),
    };

    MailMessage {
        id: format!("imap_{}_{}", now_ms, seq),
        from,
        subject,
        text,
        html,
        date,
    }
}

fn to_chrono(timestamp: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp, 0).single()
}

struct ImapConnection {
    stream: BufReader<TlsStream<TcpStream>>,
    tag: u32,
}

impl ImapConnection {
    async fn connect() -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));

        let tcp = TcpStream::connect((IMAP_HOST, IMAP_PORT))
            .await
            .map_err(|e| Error::Internal(format!("IMAP connect failed: {}", e)))?;
        let server_name = ServerName::try_from(IMAP_HOST)
            .map_err(|_| Error::Internal("Invalid IMAP TLS name".to_string()))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Internal(format!("IMAP TLS handshake failed: {}", e)))?;

        let mut conn = Self {
            stream: BufReader::new(tls),
            tag: 0,
        };
        // Server greeting
        conn.read_line().await?;
        Ok(conn)
    }

    fn next_tag(&mut self) -> String {
        self.tag += 1;
        format!("A{}", self.tag)
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .stream
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Internal(format!("IMAP read failed: {}", e)))?;
        if read == 0 {
            return Err(Error::Internal("IMAP connection closed by peer".to_string()));
        }
        Ok(line)
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Internal(format!("IMAP write failed: {}", e)))?;
        self.stream
            .write_all(b"\r\n")
            .await
            .map_err(|e| Error::Internal(format!("IMAP write failed: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| Error::Internal(format!("IMAP write failed: {}", e)))
    }

    async fn authenticate(&mut self, email: &str, access_token: &str) -> Result<()> {
        let tag = self.next_tag();
        let sasl = xoauth2_response(email, access_token);
        self.write_line(&format!("{} AUTHENTICATE XOAUTH2 {}", tag, sasl))
            .await?;

        loop {
            let line = self.read_line().await?;
            if line.starts_with('+') {
                // Error challenge; an empty line tells the server to finish
                self.write_line("").await?;
            } else if line.starts_with(&tag) {
                if line[tag.len()..].trim_start().starts_with("OK") {
                    return Ok(());
                }
                return Err(Error::Internal(format!(
                    "IMAP authentication failed: {}",
                    line.trim()
                )));
            }
        }
    }

    /// Read-only select
    async fn examine(&mut self, folder: &str) -> Result<()> {
        let tag = self.next_tag();
        self.write_line(&format!("{} EXAMINE {}", tag, folder)).await?;
        loop {
            let line = self.read_line().await?;
            if line.starts_with(&tag) {
                if line[tag.len()..].trim_start().starts_with("OK") {
                    return Ok(());
                }
                return Err(Error::Internal(format!(
                    "IMAP EXAMINE failed: {}",
                    line.trim()
                )));
            }
        }
    }

    async fn search_all(&mut self) -> Result<Vec<u32>> {
        let tag = self.next_tag();
        self.write_line(&format!("{} UID SEARCH ALL", tag)).await?;
        let mut uids = Vec::new();
        loop {
            let line = self.read_line().await?;
            if let Some(rest) = line.strip_prefix("* SEARCH") {
                uids.extend(parse_search_uids(rest));
            } else if line.starts_with(&tag) {
                if line[tag.len()..].trim_start().starts_with("OK") {
                    uids.sort_unstable();
                    return Ok(uids);
                }
                return Err(Error::Internal(format!(
                    "IMAP SEARCH failed: {}",
                    line.trim()
                )));
            }
        }
    }

    /// Fetch the raw body of one UID, tolerating missing messages
    async fn fetch_body(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        let tag = self.next_tag();
        self.write_line(&format!("{} UID FETCH {} (BODY.PEEK[])", tag, uid))
            .await?;

        let mut body: Option<Vec<u8>> = None;
        loop {
            let line = self.read_line().await?;
            if line.starts_with('*') {
                if let Some(size) = parse_literal_size(&line) {
                    let mut buffer = vec![0u8; size];
                    self.stream
                        .read_exact(&mut buffer)
                        .await
                        .map_err(|e| Error::Internal(format!("IMAP read failed: {}", e)))?;
                    body = Some(buffer);
                }
            } else if line.starts_with(&tag) {
                if line[tag.len()..].trim_start().starts_with("OK") {
                    return Ok(body);
                }
                return Err(Error::Internal(format!(
                    "IMAP FETCH failed: {}",
                    line.trim()
                )));
            }
        }
    }

    /// Best-effort; the TLS stream closes on drop regardless
    async fn logout(&mut self) {
        let tag = self.next_tag();
        if self.write_line(&format!("{} LOGOUT", tag)).await.is_ok() {
            let _ = self.read_line().await;
        }
    }
}

/// UIDs from the payload of a `* SEARCH` line
fn parse_search_uids(rest: &str) -> Vec<u32> {
    rest.split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// Octet count from a trailing `{n}` literal marker
fn parse_literal_size(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    let open = trimmed.rfind('{')?;
    let close = trimmed.rfind('}')?;
    if close != trimmed.len() - 1 || close <= open {
        return None;
    }
    trimmed[open + 1..close].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xoauth2_encoding_matches_sasl_shape() {
        let encoded = xoauth2_response("user@outlook.com", "EwBAAl3BAAUF");
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(
            decoded,
            b"user=user@outlook.com\x01auth=Bearer EwBAAl3BAAUF\x01\x01"
        );
    }

    #[test]
    fn search_line_parses_uids() {
        assert_eq!(parse_search_uids(" 1 2 34 560"), vec![1, 2, 34, 560]);
        assert_eq!(parse_search_uids(""), Vec::<u32>::new());
    }

    #[test]
    fn literal_size_parses_from_fetch_line() {
        assert_eq!(
            parse_literal_size("* 1 FETCH (UID 5 BODY[] {2048}\r\n"),
            Some(2048)
        );
        assert_eq!(parse_literal_size("* 1 FETCH (FLAGS (\\Seen))\r\n"), None);
        assert_eq!(parse_literal_size("{12"), None);
    }

    #[test]
    fn parse_message_extracts_headers_and_bodies() {
        let raw = b"From: Sender <sender@example.com>\r\n\
            To: user@outlook.com\r\n\
            Subject: Verification\r\n\
            Date: Wed, 1 May 2024 10:30:00 +0000\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            Your code is 482913\r\n";
        let message = parse_message(raw, 1_700_000_000_000, 3);
        assert_eq!(message.id, "imap_1700000000000_3");
        assert_eq!(message.from, "sender@example.com");
        assert_eq!(message.subject, "Verification");
        assert!(message.text.contains("482913"));
        assert_eq!(message.date.unwrap().timestamp(), 1_714_559_400);
    }

    #[test]
    fn unparseable_message_still_yields_entry() {
        let message = parse_message(b"", 1, 1);
        assert_eq!(message.id, "imap_1_1");
        assert_eq!(message.from, "");
    }

    #[test]
    fn messages_sort_most_recent_first() {
        let older = MailMessage {
            id: "a".into(),
            from: String::new(),
            subject: String::new(),
            text: String::new(),
            html: String::new(),
            date: to_chrono(1_000),
        };
        let newer = MailMessage {
            id: "b".into(),
            from: String::new(),
            subject: String::new(),
            text: String::new(),
            html: String::new(),
            date: to_chrono(2_000),
        };
        let undated = MailMessage {
            id: "c".into(),
            from: String::new(),
            subject: String::new(),
            text: String::new(),
            html: String::new(),
            date: None,
        };
        let mut messages = vec![older.clone(), undated.clone(), newer.clone()];
        messages.sort_by(|a, b| b.date.cmp(&a.date));
        assert_eq!(messages[0].id, "b");
        assert_eq!(messages[1].id, "a");
        assert_eq!(messages[2].id, "c");
    }
}
