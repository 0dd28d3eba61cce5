//! User Password Value Object
//!
//! Thin domain layer over `platform::password`: adds the sign-up length
//! policy and keeps the PHC string opaque to the rest of the crate.
//!
//! ```rust
//! use auth::domain::value_object::user_password::{RawPassword, UserPassword};
//!
//! let raw = RawPassword::new("correct horse battery".to_string()).unwrap();
//! let stored = UserPassword::from_raw(&raw, None).unwrap();
//! assert!(stored.verify(&raw, None));
//! ```

use platform::password::{ClearTextPassword, HashedPassword, PasswordHashError, PasswordInputError};
use std::fmt;
use thiserror::Error;

/// NIST SP 800-63B minimum for user-chosen secrets
pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    #[error("Password must be at least {min} characters")]
    TooShort { min: usize },

    #[error(transparent)]
    Input(#[from] PasswordInputError),
}

/// Password as typed by the user; zeroized on drop
pub struct RawPassword(ClearTextPassword);

impl RawPassword {
    /// Normalize and bound-check, without the minimum length policy.
    ///
    /// Sign-in uses this so that a policy change never locks out existing
    /// accounts.
    pub fn new(raw: String) -> Result<Self, PasswordError> {
        Ok(Self(ClearTextPassword::new(raw)?))
    }

    /// [`RawPassword::new`] plus the minimum length required for new accounts
    pub fn new_for_sign_up(raw: String) -> Result<Self, PasswordError> {
        let password = Self::new(raw)?;
        if password.0.char_count() < MIN_PASSWORD_LENGTH {
            return Err(PasswordError::TooShort {
                min: MIN_PASSWORD_LENGTH,
            });
        }
        Ok(password)
    }
}

impl fmt::Debug for RawPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawPassword").field(&"[REDACTED]").finish()
    }
}

/// Stored Argon2id hash
#[derive(Clone, PartialEq, Eq)]
pub struct UserPassword(HashedPassword);

impl UserPassword {
    pub fn from_raw(raw: &RawPassword, pepper: Option<&[u8]>) -> Result<Self, PasswordHashError> {
        raw.0.hash(pepper).map(Self)
    }

    pub fn from_db(phc: impl Into<String>) -> Result<Self, PasswordHashError> {
        HashedPassword::from_phc_string(phc).map(Self)
    }

    pub fn as_phc_string(&self) -> &str {
        self.0.as_phc_string()
    }

    pub fn verify(&self, raw: &RawPassword, pepper: Option<&[u8]>) -> bool {
        self.0.verify(&raw.0, pepper)
    }
}

impl fmt::Debug for UserPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UserPassword").field(&"[HASH]").finish()
    }
}
