//! Verify Email Use Case

use std::sync::Arc;

use chrono::Utc;

use crate::domain::entity::user::User;
use crate::domain::repository::{DirectoryError, UserDirectory};
use crate::error::{AuthError, AuthResult};

pub struct VerifyEmailInput {
    pub email_id: i64,
    pub secret_code: String,
}

pub struct VerifyEmailUseCase<D>
where
    D: UserDirectory,
{
    directory: Arc<D>,
}

impl<D> VerifyEmailUseCase<D>
where
    D: UserDirectory,
{
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    pub async fn execute(&self, input: VerifyEmailInput) -> AuthResult<User> {
        if input.secret_code.is_empty() {
            return Err(AuthError::VerificationInvalid);
        }

        let user = self
            .directory
            .confirm_email(input.email_id, &input.secret_code, Utc::now())
            .await
            .map_err(|e| match e {
                DirectoryError::NotFound => AuthError::VerificationInvalid,
                other => other.into(),
            })?;

        tracing::info!(user_id = %user.user_id, email_id = input.email_id, "Email verified");
        Ok(user)
    }
}
