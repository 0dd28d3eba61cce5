//! Repository Traits
//!
//! Persistence capabilities the use cases depend on. Implementation is in
//! the infrastructure layer.

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use thiserror::Error;

use crate::domain::entity::user::User;
use crate::domain::value_object::email::Email;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Unique constraint on the email address
    #[error("Identity already registered")]
    DuplicateIdentity,

    #[error("Record not found")]
    NotFound,

    #[error("User directory unavailable: {0}")]
    Unavailable(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Identity lookup and email ownership records
#[trait_variant::make(UserDirectory: Send)]
pub trait LocalUserDirectory {
    async fn create(&self, user: &User) -> DirectoryResult<()>;

    async fn find_by_id(&self, user_id: &UserId) -> DirectoryResult<Option<User>>;

    async fn find_by_email(&self, email: &Email) -> DirectoryResult<Option<User>>;

    /// Overwrite the mutable profile fields of an existing user
    ///
    /// Names, password hash and `updated_at` are written; `NotFound` when
    /// the user no longer exists.
    async fn update(&self, user: &User) -> DirectoryResult<User>;

    /// Redeem a verification and mark the owner's email verified
    ///
    /// `NotFound` covers unknown ids, wrong secrets, used and expired links.
    async fn confirm_email(
        &self,
        verification_id: i64,
        secret_code: &str,
        now: DateTime<Utc>,
    ) -> DirectoryResult<User>;
}
