//! Update Profile Use Case
//!
//! Partial update of the caller's own names and password.

use std::sync::Arc;

use chrono::Utc;
use kernel::id::UserId;

use crate::application::config::AuthConfig;
use crate::domain::entity::user::User;
use crate::domain::repository::UserDirectory;
use crate::domain::value_object::user_password::{RawPassword, UserPassword};
use crate::error::{AuthError, AuthResult};

/// Absent fields are left untouched
#[derive(Default)]
pub struct UpdateProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

impl UpdateProfileInput {
    fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.password.is_none()
    }
}

pub struct UpdateProfileUseCase<D>
where
    D: UserDirectory,
{
    directory: Arc<D>,
    config: Arc<AuthConfig>,
}

impl<D> UpdateProfileUseCase<D>
where
    D: UserDirectory,
{
    pub fn new(directory: Arc<D>, config: Arc<AuthConfig>) -> Self {
        Self { directory, config }
    }

    pub async fn execute(
        &self,
        subject_id: &UserId,
        input: UpdateProfileInput,
    ) -> AuthResult<User> {
        if input.is_empty() {
            return Err(AuthError::InvalidInput("Nothing to update".to_string()));
        }

        // Validate before touching storage so a bad password changes nothing
        let password = match input.password {
            Some(raw) => {
                let raw = RawPassword::new_for_sign_up(raw)?;
                Some(
                    UserPassword::from_raw(&raw, self.config.pepper())
                        .map_err(|e| AuthError::Internal(e.to_string()))?,
                )
            }
            None => None,
        };

        let mut user = self
            .directory
            .find_by_id(subject_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(first_name) = input.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = input.last_name {
            user.last_name = last_name.trim().to_string();
        }
        let password_changed = password.is_some();
        if let Some(password) = password {
            user.password = password;
        }
        user.updated_at = Utc::now();

        // NotFound here means the account was deleted after the read
        let user = self.directory.update(&user).await?;

        tracing::info!(user_id = %user.user_id, password_changed, "Profile updated");
        Ok(user)
    }
}
