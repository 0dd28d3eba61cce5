//! Sign Up Use Case
//!
//! Creates a new user account and queues the verification email.

use std::sync::Arc;

use chrono::Utc;
use kernel::id::UserId;
use tasks::handlers::{TASK_SEND_VERIFY_EMAIL, VerifyEmailPayload};
use tasks::{EnqueueOptions, QueueClass, QueueError, TaskQueue};

use crate::application::config::AuthConfig;
use crate::domain::entity::user::User;
use crate::domain::repository::UserDirectory;
use crate::domain::value_object::{
    email::Email,
    user_password::{RawPassword, UserPassword},
};
use crate::error::{AuthError, AuthResult};

pub struct SignUpInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

pub struct SignUpOutput {
    pub user_id: UserId,
    pub email: Email,
    /// False when the account exists but the email task could not be queued
    pub verification_queued: bool,
}

pub struct SignUpUseCase<D, Q>
where
    D: UserDirectory,
    Q: TaskQueue,
{
    directory: Arc<D>,
    queue: Arc<Q>,
    config: Arc<AuthConfig>,
}

impl<D, Q> SignUpUseCase<D, Q>
where
    D: UserDirectory,
    Q: TaskQueue,
{
    pub fn new(directory: Arc<D>, queue: Arc<Q>, config: Arc<AuthConfig>) -> Self {
        Self {
            directory,
            queue,
            config,
        }
    }

    pub async fn execute(&self, input: SignUpInput) -> AuthResult<SignUpOutput> {
        let email = Email::new(&input.email)?;
        let raw_password = RawPassword::new_for_sign_up(input.password)?;

        if self.directory.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = UserPassword::from_raw(&raw_password, self.config.pepper())
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let user = User::new(
            email,
            input.first_name.trim(),
            input.last_name.trim(),
            password_hash,
            Utc::now(),
        );

        // A concurrent sign-up for the same address surfaces here as
        // DuplicateIdentity and maps to EmailTaken.
        self.directory.create(&user).await?;

        tracing::info!(user_id = %user.user_id, "User signed up");

        let verification_queued = match self.queue_verification(&user.email).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    user_id = %user.user_id,
                    error = %e,
                    "Failed to queue verification email"
                );
                false
            }
        };

        Ok(SignUpOutput {
            user_id: user.user_id,
            email: user.email,
            verification_queued,
        })
    }

    async fn queue_verification(&self, email: &Email) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(&VerifyEmailPayload {
            email: email.as_str().to_string(),
        })?;
        let options = EnqueueOptions::default()
            .queue(QueueClass::Critical)
            .max_retry(self.config.verification_max_retry)
            .process_in(self.config.verification_delay);

        self.queue
            .enqueue(TASK_SEND_VERIFY_EMAIL, payload, options)
            .await?;
        Ok(())
    }
}
