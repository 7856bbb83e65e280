//! External API call logging
//!
//! Every external handler terminates in exactly one log insert. Logger
//! failures are swallowed into the structured log so they can never mask
//! the response they describe.

use mailgate_storage::repository::{ApiLogRepository, NewApiLog};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

/// Append-only request logger
#[derive(Clone)]
pub struct RequestLogger {
    repo: ApiLogRepository,
}

impl RequestLogger {
    pub fn new(repo: ApiLogRepository) -> Self {
        Self { repo }
    }

    /// Append one record, never failing the caller
    pub async fn log(&self, record: NewApiLog) {
        if let Err(e) = self.repo.insert(record).await {
            warn!(error = %e, "api log insert failed");
        }
    }
}

/// Synthesize a request id when the client did not send one:
/// `web-{base36 millis}-{6 alphanumerics}`
pub fn synth_request_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("web-{}-{}", to_base36(millis), suffix)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_encodes_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn synthesized_ids_have_expected_shape() {
        let id = synth_request_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "web");
        assert!(parts[1].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn synthesized_ids_are_unique_enough() {
        let a = synth_request_id();
        let b = synth_request_id();
        assert_ne!(a, b);
    }
}
