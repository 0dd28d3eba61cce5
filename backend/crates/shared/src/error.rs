//! HTTP-Facing Error Vocabulary
//!
//! Domain crates keep their own `thiserror` enums and pick an [`ErrorKind`]
//! for each variant. Right before a response is written they convert into
//! [`AppError`], which only carries text that is safe to show a client.

use std::borrow::Cow;
use std::fmt;

/// Closed set of failure classes; the kind alone decides the status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    /// Missing, malformed, forged or expired credential
    Unauthorized,
    NotFound,
    /// Duplicate identity and similar state clashes
    Conflict,
    /// Database or broker unreachable; worth retrying
    ServiceUnavailable,
    InternalServerError,
}

impl ErrorKind {
    pub const fn status_code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::InternalServerError => 500,
            Self::ServiceUnavailable => 503,
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::NotFound => "Not Found",
            Self::Conflict => "Conflict",
            Self::InternalServerError => "Internal Server Error",
            Self::ServiceUnavailable => "Service Unavailable",
        }
    }

    pub const fn is_server_error(self) -> bool {
        self.status_code() >= 500
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Client-safe error, rendered as RFC 7807 problem details
///
/// ```rust
/// use kernel::error::{AppError, ErrorKind};
///
/// let err = AppError::new(ErrorKind::Conflict, "Email already registered")
///     .with_hint("Sign in instead");
/// assert_eq!(err.kind().status_code(), 409);
/// assert_eq!(err.hint(), Some("Sign in instead"));
/// ```
#[derive(Debug, Clone)]
pub struct AppError {
    kind: ErrorKind,
    detail: Cow<'static, str>,
    hint: Option<&'static str>,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn new(kind: ErrorKind, detail: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            hint: None,
        }
    }

    /// Generic 500; the real cause belongs in the server log
    pub fn internal() -> Self {
        Self::new(ErrorKind::InternalServerError, "Internal error")
    }

    pub fn with_hint(mut self, hint: &'static str) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn hint(&self) -> Option<&'static str> {
        self.hint
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for AppError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::{StatusCode, header};

        let status = StatusCode::from_u16(self.kind.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut body = serde_json::json!({
            "type": "about:blank",
            "title": self.kind.title(),
            "status": status.as_u16(),
            "detail": self.detail,
        });
        if let Some(hint) = self.hint {
            body["hint"] = hint.into();
        }

        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_and_internal_are_server_errors() {
        let server: Vec<_> = [
            ErrorKind::BadRequest,
            ErrorKind::Unauthorized,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::ServiceUnavailable,
            ErrorKind::InternalServerError,
        ]
        .into_iter()
        .filter(|k| k.is_server_error())
        .collect();

        assert_eq!(
            server,
            vec![ErrorKind::ServiceUnavailable, ErrorKind::InternalServerError]
        );
    }

    #[test]
    fn test_internal_hides_cause() {
        let err = AppError::internal();
        assert_eq!(err.kind().status_code(), 500);
        assert_eq!(err.to_string(), "Internal Server Error: Internal error");
    }

    #[cfg(feature = "axum")]
    #[test]
    fn test_renders_problem_details() {
        use axum::response::IntoResponse;

        let response = AppError::new(ErrorKind::Unauthorized, "Invalid or expired access token")
            .with_hint("Sign in again")
            .into_response();

        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/problem+json"
        );
    }
}
