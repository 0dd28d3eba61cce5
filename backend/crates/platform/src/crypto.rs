//! Cryptographic Utilities

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine, engine::general_purpose};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore, rngs::OsRng};
use std::fmt;
use thiserror::Error;

/// AES-256 key length in bytes
pub const KEY_SIZE: usize = 32;

/// GCM nonce length in bytes
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag length in bytes
pub const TAG_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("encryption failed")]
    Seal,

    /// Covers truncated input, tampering and wrong keys alike.
    #[error("decryption failed")]
    Open,
}

/// Random `[A-Za-z0-9]` string from the OS RNG
pub fn random_string(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Encode bytes as base64
pub fn to_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode base64 to bytes
pub fn from_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(s)
}

/// URL-safe base64 without padding (header-safe)
pub fn to_base64url(bytes: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Strict decode: non-canonical trailing bits are rejected
pub fn from_base64url(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::URL_SAFE_NO_PAD.decode(s)
}

/// Process-wide AES-256-GCM key.
///
/// Read-only after construction; `seal` and `open` take `&self` and can be
/// shared across threads.
#[derive(Clone)]
pub struct SymmetricKey {
    cipher: Aes256Gcm,
}

impl SymmetricKey {
    /// Build from raw key bytes. Anything other than [`KEY_SIZE`] bytes is rejected.
    pub fn from_bytes(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: key.len(),
            });
        }

        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;

        Ok(Self { cipher })
    }

    /// Encrypt and authenticate `plaintext`, binding `aad`.
    ///
    /// Output layout: `nonce (12) || ciphertext || tag (16)`.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Reverse of [`SymmetricKey::seal`]. Any modification of `sealed` or `aad`
    /// fails with [`CryptoError::Open`].
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Open);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::Open)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_random_string_charset() {
        let s = random_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(s, random_string(32));
    }

    #[test]
    fn test_base64url_rejects_standard_alphabet() {
        let encoded = to_base64url(&[0xfb, 0xff]);
        assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));
        assert_eq!(from_base64url(&encoded).unwrap(), vec![0xfb, 0xff]);
        assert!(from_base64url("+/8").is_err());
    }

    #[test]
    fn test_key_length_is_enforced() {
        assert_eq!(
            SymmetricKey::from_bytes(b"short").unwrap_err(),
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 5
            }
        );
        assert!(SymmetricKey::from_bytes(&[7u8; 33]).is_err());
        assert!(SymmetricKey::from_bytes(KEY).is_ok());
    }

    #[test]
    fn test_seal_open() {
        let key = SymmetricKey::from_bytes(KEY).unwrap();
        let sealed = key.seal(b"payload", b"header").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + b"payload".len() + TAG_SIZE);
        assert_eq!(key.open(&sealed, b"header").unwrap(), b"payload");
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let key = SymmetricKey::from_bytes(KEY).unwrap();
        let a = key.seal(b"same", b"").unwrap();
        let b = key.seal(b"same", b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_detects_tampering() {
        let key = SymmetricKey::from_bytes(KEY).unwrap();
        let sealed = key.seal(b"payload", b"header").unwrap();

        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert_eq!(key.open(&tampered, b"header"), Err(CryptoError::Open));
        }

        assert_eq!(key.open(&sealed, b"other"), Err(CryptoError::Open));
        assert_eq!(key.open(&sealed[..10], b"header"), Err(CryptoError::Open));
    }

    #[test]
    fn test_open_with_wrong_key() {
        let key = SymmetricKey::from_bytes(KEY).unwrap();
        let other = SymmetricKey::from_bytes(&[9u8; 32]).unwrap();
        let sealed = key.seal(b"payload", b"").unwrap();
        assert_eq!(other.open(&sealed, b""), Err(CryptoError::Open));
    }

    #[test]
    fn test_debug_redaction() {
        let key = SymmetricKey::from_bytes(KEY).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
