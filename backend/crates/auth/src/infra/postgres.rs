//! PostgreSQL User Directory

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use sqlx::PgPool;
use tasks::handlers::{VerificationRecord, VerificationStore, VerificationStoreError};
use uuid::Uuid;

use crate::domain::entity::email_verification::{EmailVerification, VERIFICATION_TTL};
use crate::domain::entity::user::User;
use crate::domain::repository::{DirectoryError, DirectoryResult, UserDirectory};
use crate::domain::value_object::{
    email::Email, user_password::UserPassword, user_role::UserRole,
};

const USER_COLUMNS: &str = "user_id, email, first_name, last_name, password_hash, user_role, \
                            email_verified, created_at, updated_at";

/// PostgreSQL-backed user directory
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_verification(
        &self,
        email: &Email,
        secret_code: &str,
    ) -> DirectoryResult<EmailVerification> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, VerificationRow>(
            r#"
            INSERT INTO verify_emails (user_id, email, secret_code, created_at, expires_at)
            SELECT user_id, email, $2, $3, $4
            FROM users
            WHERE email = $1
            RETURNING id, user_id, email, secret_code, is_used, created_at, expires_at
            "#,
        )
        .bind(email.as_str())
        .bind(secret_code)
        .bind(now)
        .bind(now + VERIFICATION_TTL)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DirectoryError::NotFound)?;

        Ok(row.into_verification())
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DirectoryError::NotFound,
            // Class 23 unique_violation: only the email column is unique
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                DirectoryError::DuplicateIdentity
            }
            _ => DirectoryError::Unavailable(err.to_string()),
        }
    }
}

// ============================================================================
// User Directory Implementation
// ============================================================================

impl UserDirectory for PgUserDirectory {
    async fn create(&self, user: &User) -> DirectoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id,
                email,
                first_name,
                last_name,
                password_hash,
                user_role,
                email_verified,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.password.as_phc_string())
        .bind(user.role.code())
        .bind(user.email_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, user_id: &UserId) -> DirectoryResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> DirectoryResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn update(&self, user: &User) -> DirectoryResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET first_name = $2, last_name = $3, password_hash = $4, \
             updated_at = $5 WHERE user_id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.user_id.as_uuid())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.password.as_phc_string())
        .bind(user.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DirectoryError::NotFound)?;

        row.into_user()
    }

    async fn confirm_email(
        &self,
        verification_id: i64,
        secret_code: &str,
        now: DateTime<Utc>,
    ) -> DirectoryResult<User> {
        let mut tx = self.pool.begin().await?;

        let user_id: Uuid = sqlx::query_scalar(
            r#"
            UPDATE verify_emails
            SET is_used = TRUE
            WHERE id = $1
              AND secret_code = $2
              AND is_used = FALSE
              AND expires_at > $3
            RETURNING user_id
            "#,
        )
        .bind(verification_id)
        .bind(secret_code)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DirectoryError::NotFound)?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET email_verified = TRUE, updated_at = $2 \
             WHERE user_id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        row.into_user()
    }
}

// ============================================================================
// Verification Store (consumed by the send-verify-email task)
// ============================================================================

impl VerificationStore for PgUserDirectory {
    async fn record_verification(
        &self,
        email: &str,
        secret_code: &str,
    ) -> Result<VerificationRecord, VerificationStoreError> {
        let email = Email::new(email).map_err(|_| VerificationStoreError::UnknownRecipient)?;

        match self.insert_verification(&email, secret_code).await {
            Ok(v) => Ok(VerificationRecord {
                id: v.id,
                email: v.email.into(),
                secret_code: v.secret_code,
            }),
            Err(DirectoryError::NotFound) => Err(VerificationStoreError::UnknownRecipient),
            Err(e) => Err(VerificationStoreError::Unavailable(e.to_string())),
        }
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    user_role: String,
    email_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> DirectoryResult<User> {
        let password = UserPassword::from_db(self.password_hash).map_err(|e| {
            DirectoryError::Unavailable(format!("Corrupt password hash for {}: {e}", self.user_id))
        })?;
        let role = UserRole::from_code(&self.user_role).ok_or_else(|| {
            DirectoryError::Unavailable(format!(
                "Unknown role '{}' for {}",
                self.user_role, self.user_id
            ))
        })?;

        Ok(User {
            user_id: UserId::from_uuid(self.user_id),
            email: Email::from_db(self.email),
            first_name: self.first_name,
            last_name: self.last_name,
            password,
            role,
            email_verified: self.email_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    id: i64,
    user_id: Uuid,
    email: String,
    secret_code: String,
    is_used: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl VerificationRow {
    fn into_verification(self) -> EmailVerification {
        EmailVerification {
            id: self.id,
            user_id: UserId::from_uuid(self.user_id),
            email: Email::from_db(self.email),
            secret_code: self.secret_code,
            is_used: self.is_used,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}
