//! Time-based one-time password verification
//!
//! Standard RFC 6238 parameters: SHA-1, 6 digits, 30-second steps.
//! Verification accepts a symmetric skew window of 0 to 5 steps.

use mailgate_common::{Error, Result};
use totp_rs::{Algorithm, Secret, TOTP};

const MAX_WINDOW: u8 = 5;

/// Generate a fresh base32 secret (160 bits of CSPRNG material)
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

fn build(secret_base32: &str, window: u8, issuer: &str, account: &str) -> Result<TOTP> {
    let bytes = Secret::Encoded(secret_base32.trim().to_uppercase())
        .to_bytes()
        .map_err(|_| Error::TwoFactorSecretInvalid)?;
    TOTP::new(
        Algorithm::SHA1,
        6,
        window.min(MAX_WINDOW),
        30,
        bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|_| Error::TwoFactorSecretInvalid)
}

/// Provisioning URI for authenticator apps
pub fn otpauth_url(secret_base32: &str, issuer: &str, account: &str) -> Result<String> {
    build(secret_base32, 1, issuer, account).map(|totp| totp.get_url())
}

/// Verify `code` against the secret at `unix_time`, accepting codes from
/// up to `window` steps away in either direction.
pub fn verify_code_at(secret_base32: &str, code: &str, window: u8, unix_time: u64) -> Result<bool> {
    let code = code.trim();
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    let totp = build(secret_base32, window, "mailgate", "otp")?;
    Ok(totp.check(code, unix_time))
}

/// Verify `code` at the current time
pub fn verify_code(secret_base32: &str, code: &str, window: u8) -> Result<bool> {
    verify_code_at(secret_base32, code, window, now())
}

/// Code for a secret at a given time; used by tests and provisioning checks
pub fn code_at(secret_base32: &str, unix_time: u64) -> Result<String> {
    let totp = build(secret_base32, 1, "mailgate", "otp")?;
    Ok(totp.generate(unix_time))
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";
    const T: u64 = 1_700_000_000;

    #[test]
    fn generated_secret_is_base32_and_long_enough() {
        let secret = generate_secret();
        assert!(secret.len() >= 16);
        assert!(secret
            .chars()
            .all(|c| "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".contains(c)));
    }

    #[test]
    fn code_matches_within_window() {
        let code = code_at(SECRET, T).unwrap();
        assert_eq!(code.len(), 6);
        // Same step
        assert!(verify_code_at(SECRET, &code, 1, T).unwrap());
        // One step away, window 1
        assert!(verify_code_at(SECRET, &code, 1, T + 30).unwrap());
        assert!(verify_code_at(SECRET, &code, 1, T - 30).unwrap());
        // Two steps away only passes with window 2
        assert!(!verify_code_at(SECRET, &code, 1, T + 60).unwrap());
        assert!(verify_code_at(SECRET, &code, 2, T + 60).unwrap());
    }

    #[test]
    fn zero_window_requires_exact_step() {
        let code = code_at(SECRET, T).unwrap();
        assert!(verify_code_at(SECRET, &code, 0, T + 29).unwrap());
        assert!(!verify_code_at(SECRET, &code, 0, T + 30).unwrap());
    }

    #[test]
    fn malformed_codes_are_rejected_fast() {
        assert!(!verify_code_at(SECRET, "12345", 1, T).unwrap());
        assert!(!verify_code_at(SECRET, "abcdef", 1, T).unwrap());
        assert!(!verify_code_at(SECRET, "1234567", 1, T).unwrap());
    }

    #[test]
    fn invalid_secret_errors() {
        assert!(matches!(
            verify_code_at("not base32!!", "123456", 1, T),
            Err(Error::TwoFactorSecretInvalid)
        ));
    }

    #[test]
    fn otpauth_url_shape() {
        let url = otpauth_url(SECRET, "Mailgate", "admin").unwrap();
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("issuer=Mailgate"));
        assert!(url.contains("secret="));
        assert!(url.contains("algorithm=SHA1"));
        assert!(url.contains("digits=6"));
        assert!(url.contains("period=30"));
    }
}
