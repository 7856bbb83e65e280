//! Authenticated encryption of refresh tokens and 2FA secrets
//!
//! Blobs are stored as `hex(nonce):hex(tag):hex(ciphertext)` with a fresh
//! 16-byte random nonce per call. The AEAD key is the SHA-256 of the
//! configured 32-character key string, hashed once at construction. There
//! is no rotation path; re-keying means re-encrypting every blob offline.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use mailgate_common::{Error, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};

type SecretCipher = AesGcm<Aes256, U16>;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// AEAD box sealing secrets at rest
#[derive(Clone)]
pub struct SecretBox {
    cipher: SecretCipher,
}

impl SecretBox {
    /// Derive the AEAD key from the configured key string
    pub fn new(key_material: &str) -> Self {
        let digest = Sha256::digest(key_material.as_bytes());
        let cipher = SecretCipher::new(GenericArray::from_slice(digest.as_slice()));
        Self { cipher }
    }

    /// Seal a plaintext into the colon-separated hex blob format
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| Error::CryptoInvalid)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    /// Open a blob produced by `encrypt`
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        let mut parts = blob.splitn(4, ':');
        let (nonce_hex, tag_hex, ct_hex) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(nonce), Some(tag), Some(ct), None) => (nonce, tag, ct),
            _ => return Err(Error::CryptoInvalid),
        };

        let nonce = hex::decode(nonce_hex).map_err(|_| Error::CryptoInvalid)?;
        let tag = hex::decode(tag_hex).map_err(|_| Error::CryptoInvalid)?;
        let mut buffer = hex::decode(ct_hex).map_err(|_| Error::CryptoInvalid)?;

        if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(Error::CryptoInvalid);
        }

        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&nonce),
                b"",
                &mut buffer,
                GenericArray::from_slice(&tag),
            )
            .map_err(|_| Error::CryptoInvalid)?;

        String::from_utf8(buffer).map_err(|_| Error::CryptoInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_box() -> SecretBox {
        SecretBox::new("0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn round_trip() {
        let sbox = secret_box();
        for plaintext in ["", "refresh-token", "пример", "a\nb\tc"] {
            let blob = sbox.encrypt(plaintext).unwrap();
            assert_eq!(sbox.decrypt(&blob).unwrap(), plaintext);
        }
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let sbox = secret_box();
        let a = sbox.encrypt("same").unwrap();
        let b = sbox.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn blob_has_three_hex_segments() {
        let sbox = secret_box();
        let blob = sbox.encrypt("token").unwrap();
        let parts: Vec<&str> = blob.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), NONCE_LEN * 2);
        assert_eq!(parts[1].len(), TAG_LEN * 2);
        assert!(parts
            .iter()
            .all(|part| part.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn malformed_blobs_fail() {
        let sbox = secret_box();
        for blob in ["", "abc", "aa:bb", "xx:yy:zz", "aa:bb:cc:dd"] {
            assert!(matches!(sbox.decrypt(blob), Err(Error::CryptoInvalid)));
        }
    }

    #[test]
    fn short_nonce_fails() {
        let sbox = secret_box();
        let blob = sbox.encrypt("token").unwrap();
        let parts: Vec<&str> = blob.split(':').collect();
        let truncated = format!("{}:{}:{}", &parts[0][..8], parts[1], parts[2]);
        assert!(matches!(sbox.decrypt(&truncated), Err(Error::CryptoInvalid)));
    }

    #[test]
    fn bit_flip_fails_authentication() {
        let sbox = secret_box();
        let blob = sbox.encrypt("sensitive refresh token").unwrap();
        let mut bytes = blob.into_bytes();
        // Flip one hex digit of the ciphertext segment
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert!(matches!(sbox.decrypt(&tampered), Err(Error::CryptoInvalid)));
    }

    #[test]
    fn different_keys_do_not_interoperate() {
        let blob = secret_box().encrypt("token").unwrap();
        let other = SecretBox::new("ffffffffffffffffffffffffffffffff");
        assert!(matches!(other.decrypt(&blob), Err(Error::CryptoInvalid)));
    }
}
