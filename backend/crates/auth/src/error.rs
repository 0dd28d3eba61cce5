//! Auth Error Types
//!
//! HTTP-facing error variants. Each maps to a `kernel::error::ErrorKind`;
//! only the client-safe `AppError` form is ever rendered.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{AppError, ErrorKind};
use thiserror::Error;

use crate::domain::credential::TokenError;
use crate::domain::repository::DirectoryError;
use crate::domain::value_object::{email::EmailError, user_password::PasswordError};

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Request body failed validation
    #[error("{0}")]
    InvalidInput(String),

    #[error("Email already registered")]
    EmailTaken,

    /// Unknown email or wrong password; never says which
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// `Authorization` header missing or not `Bearer <token>`
    #[error("Authorization header must be 'Bearer <token>'")]
    BadHeaderFormat,

    /// Token rejected (forged, tampered or expired alike)
    #[error("Invalid or expired access token")]
    Unauthorized,

    #[error("Verification link is invalid or has expired")]
    VerificationInvalid,

    #[error("User not found")]
    UserNotFound,

    #[error("Token error: {0}")]
    Token(TokenError),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidInput(_) | AuthError::VerificationInvalid => ErrorKind::BadRequest,
            AuthError::EmailTaken => ErrorKind::Conflict,
            AuthError::InvalidCredentials
            | AuthError::BadHeaderFormat
            | AuthError::Unauthorized => ErrorKind::Unauthorized,
            AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::Unavailable(_) => ErrorKind::ServiceUnavailable,
            AuthError::Token(_) | AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Server-side details never reach the client
    pub fn to_app_error(&self) -> AppError {
        match self {
            AuthError::Token(_) | AuthError::Internal(_) => AppError::internal(),
            AuthError::Unavailable(_) => {
                AppError::new(ErrorKind::ServiceUnavailable, "Service temporarily unavailable")
                    .with_hint("Please retry shortly")
            }
            AuthError::BadHeaderFormat | AuthError::Unauthorized => {
                AppError::new(self.kind(), self.to_string()).with_hint("Sign in again")
            }
            _ => AppError::new(self.kind(), self.to_string()),
        }
    }

    fn log(&self) {
        match self {
            AuthError::Token(e) => {
                tracing::error!(error = %e, "Access token issue failed");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::Unavailable(msg) => {
                tracing::error!(message = %msg, "Auth dependency unavailable");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid sign-in attempt");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::DuplicateIdentity => AuthError::EmailTaken,
            DirectoryError::NotFound => AuthError::UserNotFound,
            DirectoryError::Unavailable(msg) => AuthError::Unavailable(msg),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::Expired => AuthError::Unauthorized,
            other => AuthError::Token(other),
        }
    }
}

impl From<EmailError> for AuthError {
    fn from(err: EmailError) -> Self {
        AuthError::InvalidInput(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_failures_collapse() {
        assert!(matches!(AuthError::from(TokenError::Expired), AuthError::Unauthorized));
        assert!(matches!(AuthError::from(TokenError::Malformed), AuthError::Unauthorized));
        assert!(matches!(
            AuthError::from(TokenError::InvalidTtl),
            AuthError::Token(TokenError::InvalidTtl)
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::BadHeaderFormat.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::EmailTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AuthError::from(DirectoryError::Unavailable("pool timed out".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_internal_detail_hidden() {
        let err = AuthError::Internal("connection string leaked".into()).to_app_error();
        assert_eq!(err.detail(), "Internal error");
    }
}
