//! Send Verify Email Task
//!
//! Records a one-time secret for the address, then mails a link carrying
//! `email_id` and `secret_code` back to the verification endpoint.

use std::sync::Arc;

use platform::crypto::random_string;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::mux::{TaskContext, TaskHandler};
use crate::error::TaskError;
use crate::handlers::mail::{MailError, Mailer};

pub const TASK_SEND_VERIFY_EMAIL: &str = "task:send_verify_email";

/// Length of the secret embedded in the verification link
pub const SECRET_CODE_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyEmailPayload {
    pub email: String,
}

/// A stored verification request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord {
    pub id: i64,
    pub email: String,
    pub secret_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationStoreError {
    /// No user owns the address (yet)
    #[error("No user registered with this email")]
    UnknownRecipient,

    #[error("Verification store unavailable: {0}")]
    Unavailable(String),
}

#[trait_variant::make(VerificationStore: Send)]
pub trait LocalVerificationStore {
    async fn record_verification(
        &self,
        email: &str,
        secret_code: &str,
    ) -> Result<VerificationRecord, VerificationStoreError>;
}

pub struct SendVerifyEmailHandler<S, M> {
    store: Arc<S>,
    mailer: Arc<M>,
    verify_url: String,
    app_name: String,
}

impl<S, M> SendVerifyEmailHandler<S, M> {
    /// `verify_url` is the endpoint the link points at, without query string
    pub fn new(
        store: Arc<S>,
        mailer: Arc<M>,
        verify_url: impl Into<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            verify_url: verify_url.into(),
            app_name: app_name.into(),
        }
    }

    pub fn verification_link(&self, record: &VerificationRecord) -> String {
        format!(
            "{}?email_id={}&secret_code={}",
            self.verify_url, record.id, record.secret_code
        )
    }

    fn render(&self, record: &VerificationRecord) -> (String, String) {
        let subject = format!("Welcome to {}", self.app_name);
        let body = format!(
            "Hello,<br/>\
             Thank you for registering with us!<br/>\
             Please <a href=\"{}\">click here</a> to verify your email address.<br/>",
            self.verification_link(record)
        );
        (subject, body)
    }
}

impl<S, M> TaskHandler for SendVerifyEmailHandler<S, M>
where
    S: VerificationStore + Send + Sync + 'static,
    M: Mailer + Send + Sync + 'static,
{
    type Payload = VerifyEmailPayload;
    const KIND: &'static str = TASK_SEND_VERIFY_EMAIL;

    async fn handle(&self, payload: VerifyEmailPayload, ctx: TaskContext) -> Result<(), TaskError> {
        if payload.email.trim().is_empty() {
            return Err(TaskError::skip_retry("empty recipient address"));
        }

        let secret_code = random_string(SECRET_CODE_LENGTH);
        // The signing-up request may not have committed the user row yet,
        // so an unknown recipient is retried like any other store failure.
        let record = self
            .store
            .record_verification(&payload.email, &secret_code)
            .await
            .map_err(TaskError::transient)?;

        let (subject, body) = self.render(&record);
        self.mailer
            .send_email(std::slice::from_ref(&payload.email), &subject, &body)
            .await
            .map_err(|e| match e {
                MailError::Delivery(_) => TaskError::transient(e),
                // Would fail the same way on every attempt
                MailError::NoRecipients | MailError::InvalidAddress { .. } => {
                    TaskError::skip_retry(e)
                }
            })?;

        tracing::info!(
            task_id = %ctx.task_id,
            verification_id = record.id,
            retried = ctx.retried,
            "Verification email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::domain::envelope::TaskEnvelope;
    use crate::domain::queue::QueueClass;

    #[derive(Default)]
    struct FakeStore {
        records: Mutex<Vec<VerificationRecord>>,
        known: Vec<String>,
    }

    impl VerificationStore for FakeStore {
        async fn record_verification(
            &self,
            email: &str,
            secret_code: &str,
        ) -> Result<VerificationRecord, VerificationStoreError> {
            if !self.known.iter().any(|k| k == email) {
                return Err(VerificationStoreError::UnknownRecipient);
            }
            let mut records = self.records.lock().unwrap();
            let record = VerificationRecord {
                id: records.len() as i64 + 1,
                email: email.to_string(),
                secret_code: secret_code.to_string(),
            };
            records.push(record.clone());
            Ok(record)
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(Vec<String>, String, String)>>,
        fail_with: Mutex<Option<MailError>>,
    }

    impl Mailer for RecordingMailer {
        async fn send_email(
            &self,
            to: &[String],
            subject: &str,
            body: &str,
        ) -> Result<(), MailError> {
            if let Some(err) = self.fail_with.lock().unwrap().clone() {
                return Err(err);
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_vec(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn ctx() -> TaskContext {
        let envelope = TaskEnvelope::new(
            TASK_SEND_VERIFY_EMAIL,
            Vec::new(),
            QueueClass::Critical,
            10,
            Utc::now(),
        );
        TaskContext::from(&envelope)
    }

    fn handler(
        known: &[&str],
    ) -> (
        SendVerifyEmailHandler<FakeStore, RecordingMailer>,
        Arc<FakeStore>,
        Arc<RecordingMailer>,
    ) {
        let store = Arc::new(FakeStore {
            known: known.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        let mailer = Arc::new(RecordingMailer::default());
        let handler = SendVerifyEmailHandler::new(
            store.clone(),
            mailer.clone(),
            "http://localhost:8080/v1/auth/verify-email",
            "Veemon",
        );
        (handler, store, mailer)
    }

    #[tokio::test]
    async fn test_sends_link_with_recorded_secret() {
        let (handler, store, mailer) = handler(&["ada@example.com"]);

        handler
            .handle(
                VerifyEmailPayload {
                    email: "ada@example.com".to_string(),
                },
                ctx(),
            )
            .await
            .unwrap();

        let record = store.records.lock().unwrap()[0].clone();
        assert_eq!(record.secret_code.len(), SECRET_CODE_LENGTH);

        let sent = mailer.sent.lock().unwrap();
        let (to, subject, body) = &sent[0];
        assert_eq!(to, &vec!["ada@example.com".to_string()]);
        assert_eq!(subject, "Welcome to Veemon");
        assert!(body.contains(&format!(
            "http://localhost:8080/v1/auth/verify-email?email_id=1&secret_code={}",
            record.secret_code
        )));
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_transient() {
        let (handler, _, mailer) = handler(&[]);

        let err = handler
            .handle(
                VerifyEmailPayload {
                    email: "ghost@example.com".to_string(),
                },
                ctx(),
            )
            .await
            .unwrap_err();

        assert!(!err.is_permanent());
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_address_is_permanent() {
        let (handler, _, _) = handler(&[]);
        let err = handler
            .handle(
                VerifyEmailPayload {
                    email: " ".to_string(),
                },
                ctx(),
            )
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_mail_failures_are_classified() {
        let (handler, _, mailer) = handler(&["ada@example.com"]);
        let payload = || VerifyEmailPayload {
            email: "ada@example.com".to_string(),
        };

        *mailer.fail_with.lock().unwrap() = Some(MailError::Delivery("relay down".into()));
        assert!(!handler.handle(payload(), ctx()).await.unwrap_err().is_permanent());

        *mailer.fail_with.lock().unwrap() = Some(MailError::InvalidAddress {
            address: "ada@example.com".into(),
            reason: "rejected".into(),
        });
        assert!(handler.handle(payload(), ctx()).await.unwrap_err().is_permanent());
    }
}
