//! Bearer Auth Gate
//!
//! Turns `Authorization: Bearer <token>` into an [`AuthIdentity`] in the
//! request extensions. Header shape errors never reach the verifier, and
//! forged and expired tokens get the same response.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use kernel::id::{CredentialId, UserId};

use crate::domain::credential::{CredentialPayload, TokenVerifier};
use crate::error::{AuthError, AuthResult};

const BEARER_SCHEME: &str = "bearer";

/// Verified caller, readable by any handler behind the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub subject_id: UserId,
    pub role: String,
    pub credential_id: CredentialId,
    pub expires_at: DateTime<Utc>,
}

impl From<CredentialPayload> for AuthIdentity {
    fn from(payload: CredentialPayload) -> Self {
        Self {
            subject_id: payload.subject_id(),
            role: payload.role().to_string(),
            credential_id: payload.credential_id(),
            expires_at: payload.expires_at(),
        }
    }
}

/// Middleware state
#[derive(Clone)]
pub struct AuthGateState {
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AuthGateState {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

/// Extract the token from a `Bearer <token>` header value
///
/// Exactly one space; the scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::BadHeaderFormat)?
        .to_str()
        .map_err(|_| AuthError::BadHeaderFormat)?;

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        [scheme, token] if scheme.eq_ignore_ascii_case(BEARER_SCHEME) && !token.is_empty() => {
            Ok(*token)
        }
        _ => Err(AuthError::BadHeaderFormat),
    }
}

/// Header check plus token verification, without touching the request
pub fn authenticate(verifier: &dyn TokenVerifier, headers: &HeaderMap) -> AuthResult<AuthIdentity> {
    let token = bearer_token(headers)?;

    match verifier.verify(token) {
        Ok(payload) => Ok(payload.into()),
        Err(e) => {
            // The distinction stays in the logs only
            tracing::debug!(error = %e, "Bearer token rejected");
            Err(AuthError::Unauthorized)
        }
    }
}

/// Middleware that requires a valid bearer token
pub async fn require_bearer(
    State(gate): State<AuthGateState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = authenticate(gate.verifier.as_ref(), req.headers())?;
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for AuthIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthIdentity>()
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_shapes() {
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("BEARER abc")).unwrap(), "abc");

        for bad in [
            "Bearer",
            "Bearer ",
            "Bearer  abc",
            "Bearer abc def",
            "Basic abc",
            "abc",
            "",
            " Bearer abc",
        ] {
            assert!(
                matches!(bearer_token(&headers(bad)), Err(AuthError::BadHeaderFormat)),
                "accepted {bad:?}"
            );
        }

        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::BadHeaderFormat)
        ));
    }
}
