//! Email Verification Entity

use chrono::{DateTime, Duration, Utc};
use kernel::id::UserId;

use crate::domain::value_object::email::Email;

/// How long a verification link stays usable
pub const VERIFICATION_TTL: Duration = Duration::minutes(15);

/// One-time secret mailed to a user to prove address ownership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailVerification {
    /// Database sequence; appears in the link as `email_id`
    pub id: i64,
    pub user_id: UserId,
    pub email: Email,
    pub secret_code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EmailVerification {
    pub fn is_redeemable_at(&self, secret_code: &str, now: DateTime<Utc>) -> bool {
        !self.is_used && now < self.expires_at && self.secret_code == secret_code
    }
}
