//! Task Handlers

pub mod mail;
pub mod verify_email;

// Re-exports
pub use mail::{LogMailer, MailError, Mailer, SmtpMailer, SmtpSettings};
pub use verify_email::{
    SendVerifyEmailHandler, TASK_SEND_VERIFY_EMAIL, VerificationRecord, VerificationStore,
    VerificationStoreError, VerifyEmailPayload,
};
