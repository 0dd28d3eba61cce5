//! Profile Use Case
//!
//! Resolves the authenticated caller to their stored profile.

use std::sync::Arc;

use kernel::id::UserId;

use crate::domain::entity::user::User;
use crate::domain::repository::UserDirectory;
use crate::error::{AuthError, AuthResult};

pub struct ProfileOutput {
    pub user: User,
}

pub struct ProfileUseCase<D>
where
    D: UserDirectory,
{
    directory: Arc<D>,
}

impl<D> ProfileUseCase<D>
where
    D: UserDirectory,
{
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    /// A valid token for a deleted account is a 404, not a 401
    pub async fn execute(&self, subject_id: &UserId) -> AuthResult<ProfileOutput> {
        let user = self
            .directory
            .find_by_id(subject_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(ProfileOutput { user })
    }
}
