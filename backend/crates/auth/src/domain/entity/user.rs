//! User Entity

use chrono::{DateTime, Utc};
use kernel::id::UserId;

use crate::domain::value_object::{email::Email, user_password::UserPassword, user_role::UserRole};

/// Registered principal
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    /// Unique; also the sign-in identifier
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub password: UserPassword,
    pub role: UserRole,
    /// Set once the verification link has been followed
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New unverified account with the default role
    pub fn new(
        email: Email,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        password: UserPassword,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: UserId::new(),
            email,
            first_name: first_name.into(),
            last_name: last_name.into(),
            password,
            role: UserRole::default(),
            email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, _) => self.last_name.clone(),
        }
    }
}
