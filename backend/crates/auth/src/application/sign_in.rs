//! Sign In Use Case
//!
//! Checks the password and issues a stateless access token.

use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::domain::credential::{CredentialPayload, TokenIssuer};
use crate::domain::entity::user::User;
use crate::domain::repository::UserDirectory;
use crate::domain::value_object::{email::Email, user_password::RawPassword};
use crate::error::{AuthError, AuthResult};

pub struct SignInInput {
    pub email: String,
    pub password: String,
}

pub struct SignInOutput {
    pub credential: CredentialPayload,
    pub user: User,
}

pub struct SignInUseCase<D>
where
    D: UserDirectory,
{
    directory: Arc<D>,
    issuer: Arc<dyn TokenIssuer>,
    config: Arc<AuthConfig>,
}

impl<D> SignInUseCase<D>
where
    D: UserDirectory,
{
    pub fn new(directory: Arc<D>, issuer: Arc<dyn TokenIssuer>, config: Arc<AuthConfig>) -> Self {
        Self {
            directory,
            issuer,
            config,
        }
    }

    pub async fn execute(&self, input: SignInInput) -> AuthResult<SignInOutput> {
        // Malformed input is indistinguishable from a wrong password
        let email = Email::new(&input.email).map_err(|_| AuthError::InvalidCredentials)?;
        let raw_password =
            RawPassword::new(input.password).map_err(|_| AuthError::InvalidCredentials)?;

        let user = self
            .directory
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.password.verify(&raw_password, self.config.pepper()) {
            return Err(AuthError::InvalidCredentials);
        }

        let credential = self.issuer.issue(
            user.user_id,
            user.role.code(),
            self.config.access_token_ttl,
        )?;

        tracing::info!(
            user_id = %user.user_id,
            credential_id = %credential.credential_id(),
            expires_at = %credential.expires_at(),
            "User signed in"
        );

        Ok(SignInOutput { credential, user })
    }
}
