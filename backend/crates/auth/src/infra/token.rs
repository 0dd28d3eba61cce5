//! AEAD Access Tokens
//!
//! Wire form: `v1.local.` + base64url(nonce || ciphertext || tag), sealed
//! with AES-256-GCM. The header is bound as associated data so a token
//! cannot be replayed under a different version prefix.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use kernel::id::UserId;
use platform::crypto::{CryptoError, SymmetricKey, from_base64url, to_base64url};

use crate::domain::credential::{CredentialPayload, TokenError, TokenIssuer, TokenVerifier};

pub const TOKEN_HEADER: &str = "v1.local.";

#[derive(Clone)]
pub struct AeadTokenMaker {
    key: SymmetricKey,
}

impl AeadTokenMaker {
    /// Fails unless `key` is exactly 32 bytes
    pub fn new(key: &[u8]) -> Result<Self, TokenError> {
        let key = SymmetricKey::from_bytes(key).map_err(|e| match e {
            CryptoError::InvalidKeyLength { expected, actual } => {
                TokenError::KeyMisconfigured { expected, actual }
            }
            other => TokenError::Internal(other.to_string()),
        })?;
        Ok(Self { key })
    }

    fn encode(&self, payload: &CredentialPayload) -> Result<String, TokenError> {
        let plaintext =
            serde_json::to_vec(payload).map_err(|e| TokenError::Internal(e.to_string()))?;
        let sealed = self
            .key
            .seal(&plaintext, TOKEN_HEADER.as_bytes())
            .map_err(|e| TokenError::Internal(e.to_string()))?;

        Ok(format!("{TOKEN_HEADER}{}", to_base64url(&sealed)))
    }

    fn decode(&self, token: &str) -> Result<CredentialPayload, TokenError> {
        let body = token
            .strip_prefix(TOKEN_HEADER)
            .ok_or(TokenError::Malformed)?;
        let sealed = from_base64url(body).map_err(|_| TokenError::Malformed)?;
        let plaintext = self
            .key
            .open(&sealed, TOKEN_HEADER.as_bytes())
            .map_err(|_| TokenError::Malformed)?;
        let payload: CredentialPayload =
            serde_json::from_slice(&plaintext).map_err(|_| TokenError::Malformed)?;

        if !payload.is_well_formed() {
            return Err(TokenError::Malformed);
        }
        Ok(payload.with_token(token))
    }
}

impl fmt::Debug for AeadTokenMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadTokenMaker")
            .field("header", &TOKEN_HEADER)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer for AeadTokenMaker {
    fn issue_at(
        &self,
        subject_id: UserId,
        role: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<CredentialPayload, TokenError> {
        let payload = CredentialPayload::new(subject_id, role, ttl, now)?;
        let token = self.encode(&payload)?;
        Ok(payload.with_token(token))
    }
}

impl TokenVerifier for AeadTokenMaker {
    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialPayload, TokenError> {
        let payload = self.decode(token)?;
        if payload.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

    fn maker() -> AeadTokenMaker {
        AeadTokenMaker::new(KEY).unwrap()
    }

    #[test]
    fn test_key_length_checked() {
        assert_eq!(
            AeadTokenMaker::new(b"too short").unwrap_err(),
            TokenError::KeyMisconfigured {
                expected: 32,
                actual: 9
            }
        );
        assert!(matches!(
            AeadTokenMaker::new(&[0u8; 33]),
            Err(TokenError::KeyMisconfigured { actual: 33, .. })
        ));
    }

    #[test]
    fn test_issue_then_verify() {
        let maker = maker();
        let subject = UserId::new();
        let now = Utc::now();

        let issued = maker
            .issue_at(subject, "admin", Duration::minutes(15), now)
            .unwrap();
        assert!(issued.token().starts_with(TOKEN_HEADER));

        let verified = maker.verify_at(issued.token(), now).unwrap();
        assert_eq!(verified, issued);
        assert_eq!(verified.subject_id(), subject);
        assert_eq!(verified.role(), "admin");
    }

    #[test]
    fn test_expiry_boundary() {
        let maker = maker();
        let now = Utc::now();
        let issued = maker
            .issue_at(UserId::new(), "user", Duration::seconds(60), now)
            .unwrap();

        assert!(maker.verify_at(issued.token(), now + Duration::seconds(59)).is_ok());
        assert_eq!(
            maker.verify_at(issued.token(), now + Duration::seconds(60)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_hour_long_token() {
        let maker = maker();
        let now = Utc::now();
        let issued = maker
            .issue_at(UserId::new(), "user", Duration::hours(1), now)
            .unwrap();

        let verified = maker
            .verify_at(issued.token(), now + Duration::minutes(30))
            .unwrap();
        assert_eq!(verified.expires_at(), now + Duration::hours(1));
        assert_eq!(
            maker.verify_at(issued.token(), now + Duration::minutes(61)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_tampering_is_malformed() {
        let maker = maker();
        let issued = maker
            .issue_at(UserId::new(), "user", Duration::minutes(1), Utc::now())
            .unwrap();
        let token = issued.token();

        // Any single substituted character in the body, trailing bits included
        for i in TOKEN_HEADER.len()..token.len() {
            let mut bytes = token.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(maker.verify(&tampered), Err(TokenError::Malformed), "position {i}");
        }

        let reprefixed = token.replacen("v1.local.", "v2.local.", 1);
        assert_eq!(maker.verify(&reprefixed), Err(TokenError::Malformed));

        assert_eq!(maker.verify(""), Err(TokenError::Malformed));
        assert_eq!(maker.verify("v1.local."), Err(TokenError::Malformed));
        assert_eq!(maker.verify("v1.local.!!!"), Err(TokenError::Malformed));
    }

    #[test]
    fn test_wrong_key_is_malformed() {
        let issued = maker()
            .issue(UserId::new(), "user", Duration::minutes(1))
            .unwrap();
        let other = AeadTokenMaker::new(&[7u8; 32]).unwrap();
        assert_eq!(other.verify(issued.token()), Err(TokenError::Malformed));
    }

    #[test]
    fn test_invalid_ttl() {
        assert_eq!(
            maker().issue(UserId::new(), "user", Duration::zero()),
            Err(TokenError::InvalidTtl)
        );
    }

    #[test]
    fn test_debug_hides_key() {
        assert!(!format!("{:?}", maker()).contains("0123"));
    }
}
