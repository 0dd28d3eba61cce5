//! Mailer Capability
//!
//! [`SmtpMailer`] delivers through a relay; [`LogMailer`] is the fallback
//! when no relay is configured and only logs what would have been sent.

use std::fmt;
use std::time::Duration;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

/// Upper bound on connect plus one SMTP exchange
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    #[error("No recipients given")]
    NoRecipients,

    #[error("Invalid mail address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[trait_variant::make(Mailer: Send)]
pub trait LocalMailer {
    async fn send_email(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError>;
}

// ============================================================================
// SMTP
// ============================================================================

/// Relay connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    /// Authentication is only attempted when both are set
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upgrade with STARTTLS; off only for local relays such as mailpit
    pub starttls: bool,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("starttls", &self.starttls)
            .finish()
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Builds the transport without connecting; a bad `from` fails here
    pub fn new(settings: &SmtpSettings, from: &str) -> Result<Self, MailError> {
        let from = parse_mailbox(from)?;

        let builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| MailError::Delivery(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.host.as_str())
        };
        let mut builder = builder.port(settings.port).timeout(Some(SMTP_TIMEOUT));
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(
        &self,
        to: &[String],
        subject: &str,
        body: &str,
    ) -> Result<Message, MailError> {
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML);
        for address in to {
            builder = builder.to(parse_mailbox(address)?);
        }

        builder
            .body(body.to_string())
            .map_err(|e| MailError::Delivery(e.to_string()))
    }
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl Mailer for SmtpMailer {
    async fn send_email(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        let message = self.build_message(to, subject, body)?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;

        tracing::info!(
            recipients = to.len(),
            subject = %subject,
            code = %response.code(),
            "Email accepted by relay"
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

// ============================================================================
// Log
// ============================================================================

#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

impl Mailer for LogMailer {
    async fn send_email(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        tracing::info!(
            from = %self.from,
            recipients = to.len(),
            subject = %subject,
            body_len = body.len(),
            "Email dispatched to log mailer"
        );
        tracing::debug!(to = ?to, body = %body, "Log mailer message");
        Ok(())
    }
}
