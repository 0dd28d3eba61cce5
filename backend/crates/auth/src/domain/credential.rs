//! Credential Payload and Token Capabilities
//!
//! A credential is self-contained: everything needed to accept it travels
//! inside the encrypted token, so the server holds no session state.

use chrono::{DateTime, Duration, Utc};
use kernel::id::{CredentialId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Construction-time only; startup must abort
    #[error("Token key must be exactly {expected} bytes (got {actual})")]
    KeyMisconfigured { expected: usize, actual: usize },

    #[error("Token lifetime must be positive")]
    InvalidTtl,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Token could not be issued: {0}")]
    Internal(String),
}

/// Decoded contents of an access token
///
/// The `token` field is never part of the encrypted plaintext; it is filled
/// in after encoding (on issue) or from the input string (on verify).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPayload {
    subject_id: UserId,
    credential_id: CredentialId,
    role: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(skip)]
    token: String,
}

impl CredentialPayload {
    /// Fresh payload with a random credential id, valid for `ttl` from `now`
    pub fn new(
        subject_id: UserId,
        role: impl Into<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, TokenError> {
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidTtl);
        }
        let expires_at = now.checked_add_signed(ttl).ok_or(TokenError::InvalidTtl)?;

        Ok(Self {
            subject_id,
            credential_id: CredentialId::new(),
            role: role.into(),
            issued_at: now,
            expires_at,
            token: String::new(),
        })
    }

    pub(crate) fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn subject_id(&self) -> UserId {
        self.subject_id
    }

    pub fn credential_id(&self) -> CredentialId {
        self.credential_id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Opaque wire form; empty until the payload has been encoded
    pub fn token(&self) -> &str {
        &self.token
    }

    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Decoded timestamps must still describe a forward interval
    pub(crate) fn is_well_formed(&self) -> bool {
        self.expires_at > self.issued_at
    }
}

/// Mints access tokens
///
/// Implementations hold the key material; callers only ever see payloads.
pub trait TokenIssuer: Send + Sync {
    fn issue_at(
        &self,
        subject_id: UserId,
        role: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<CredentialPayload, TokenError>;

    fn issue(
        &self,
        subject_id: UserId,
        role: &str,
        ttl: Duration,
    ) -> Result<CredentialPayload, TokenError> {
        self.issue_at(subject_id, role, ttl, Utc::now())
    }
}

/// Accepts access tokens
pub trait TokenVerifier: Send + Sync {
    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialPayload, TokenError>;

    fn verify(&self, token: &str) -> Result<CredentialPayload, TokenError> {
        self.verify_at(token, Utc::now())
    }
}
