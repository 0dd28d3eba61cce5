//! Password Hashing
//!
//! Argon2id with the application pepper passed as the Argon2 secret input
//! (the `K` parameter), so a leaked database alone cannot be brute-forced.
//! Inputs are NFKC-normalized; length policy beyond the hard upper bound is
//! the caller's business.

use std::fmt;

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Hard cap in code points; Argon2 cost is independent of length but the
/// normalization pass is not
pub const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordInputError {
    #[error("Password cannot be empty or contain only whitespace")]
    EmptyOrWhitespace,

    #[error("Password must be at most {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PasswordHashError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    #[error("Stored hash is not a valid PHC string")]
    InvalidHashFormat,
}

fn argon2(pepper: Option<&[u8]>) -> Result<Argon2<'_>, argon2::Error> {
    match pepper {
        Some(secret) => {
            Argon2::new_with_secret(secret, Algorithm::Argon2id, Version::V0x13, Params::default())
        }
        None => Ok(Argon2::default()),
    }
}

/// Normalized clear text, wiped on drop. Neither `Clone` nor printable.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClearTextPassword(String);

impl ClearTextPassword {
    pub fn new(mut raw: String) -> Result<Self, PasswordInputError> {
        let normalized: String = raw.nfkc().collect();
        raw.zeroize();

        let candidate = Self(normalized);
        if candidate.0.trim().is_empty() {
            return Err(PasswordInputError::EmptyOrWhitespace);
        }
        match candidate.0.chars().count() {
            n if n > MAX_PASSWORD_LENGTH => Err(PasswordInputError::TooLong {
                max: MAX_PASSWORD_LENGTH,
                actual: n,
            }),
            _ => Ok(candidate),
        }
    }

    /// Code points after normalization
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    pub fn hash(&self, pepper: Option<&[u8]>) -> Result<HashedPassword, PasswordHashError> {
        let hasher = argon2(pepper).map_err(|e| PasswordHashError::HashingFailed(e.to_string()))?;
        let salt = SaltString::generate(OsRng);

        hasher
            .hash_password(self.0.as_bytes(), &salt)
            .map(|phc| HashedPassword(phc.to_string()))
            .map_err(|e| PasswordHashError::HashingFailed(e.to_string()))
    }
}

impl fmt::Debug for ClearTextPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClearTextPassword([REDACTED])")
    }
}

/// PHC-encoded Argon2id hash, the only form that is stored
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    pub fn from_phc_string(phc: impl Into<String>) -> Result<Self, PasswordHashError> {
        let phc = phc.into();
        PasswordHash::new(&phc).map_err(|_| PasswordHashError::InvalidHashFormat)?;
        Ok(Self(phc))
    }

    pub fn as_phc_string(&self) -> &str {
        &self.0
    }

    /// `pepper` must be the one used at hash time; any mismatch is `false`
    pub fn verify(&self, password: &ClearTextPassword, pepper: Option<&[u8]>) -> bool {
        let (Ok(parsed), Ok(verifier)) = (PasswordHash::new(&self.0), argon2(pepper)) else {
            return false;
        };
        verifier.verify_password(password.0.as_bytes(), &parsed).is_ok()
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedPassword([HASH])")
    }
}
