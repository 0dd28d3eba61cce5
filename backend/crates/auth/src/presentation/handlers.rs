//! HTTP Handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use tasks::TaskQueue;

use crate::application::config::AuthConfig;
use crate::application::{
    ProfileUseCase, SignInInput, SignInUseCase, SignUpInput, SignUpUseCase, UpdateProfileInput,
    UpdateProfileUseCase, VerifyEmailInput, VerifyEmailUseCase,
};
use crate::domain::credential::{TokenIssuer, TokenVerifier};
use crate::domain::repository::UserDirectory;
use crate::error::AuthResult;
use crate::presentation::dto::{
    ProfileResponse, SignInRequest, SignInResponse, SignUpRequest, SignUpResponse,
    UpdateProfileRequest, UserResponse, VerifyEmailQuery, VerifyEmailResponse,
};
use crate::presentation::middleware::AuthIdentity;

/// Shared state for auth handlers
pub struct AuthAppState<D, Q> {
    pub directory: Arc<D>,
    pub queue: Arc<Q>,
    pub issuer: Arc<dyn TokenIssuer>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub config: Arc<AuthConfig>,
}

impl<D, Q> Clone for AuthAppState<D, Q> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            queue: self.queue.clone(),
            issuer: self.issuer.clone(),
            verifier: self.verifier.clone(),
            config: self.config.clone(),
        }
    }
}

// ============================================================================
// Sign Up
// ============================================================================

/// POST /v1/auth/sign-up
pub async fn sign_up<D, Q>(
    State(state): State<AuthAppState<D, Q>>,
    Json(req): Json<SignUpRequest>,
) -> AuthResult<(StatusCode, Json<SignUpResponse>)>
where
    D: UserDirectory + Send + Sync + 'static,
    Q: TaskQueue + Send + Sync + 'static,
{
    let use_case = SignUpUseCase::new(
        state.directory.clone(),
        state.queue.clone(),
        state.config.clone(),
    );

    let output = use_case
        .execute(SignUpInput {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            id: output.user_id.to_string(),
            email: output.email.to_string(),
            verification_queued: output.verification_queued,
        }),
    ))
}

// ============================================================================
// Sign In
// ============================================================================

/// POST /v1/auth/sign-in
pub async fn sign_in<D, Q>(
    State(state): State<AuthAppState<D, Q>>,
    Json(req): Json<SignInRequest>,
) -> AuthResult<Json<SignInResponse>>
where
    D: UserDirectory + Send + Sync + 'static,
    Q: TaskQueue + Send + Sync + 'static,
{
    let use_case = SignInUseCase::new(
        state.directory.clone(),
        state.issuer.clone(),
        state.config.clone(),
    );

    let output = use_case
        .execute(SignInInput {
            email: req.email,
            password: req.password,
        })
        .await?;

    Ok(Json(SignInResponse {
        access_token: output.credential.token().to_string(),
        token_type: "Bearer",
        access_token_expires_at: output.credential.expires_at(),
        user: UserResponse::from(&output.user),
    }))
}

// ============================================================================
// Verify Email
// ============================================================================

/// GET /v1/auth/verify-email?email_id=..&secret_code=..
pub async fn verify_email<D, Q>(
    State(state): State<AuthAppState<D, Q>>,
    Query(query): Query<VerifyEmailQuery>,
) -> AuthResult<Json<VerifyEmailResponse>>
where
    D: UserDirectory + Send + Sync + 'static,
    Q: TaskQueue + Send + Sync + 'static,
{
    let use_case = VerifyEmailUseCase::new(state.directory.clone());

    let user = use_case
        .execute(VerifyEmailInput {
            email_id: query.email_id,
            secret_code: query.secret_code,
        })
        .await?;

    Ok(Json(VerifyEmailResponse {
        is_verified: user.email_verified,
    }))
}

// ============================================================================
// Profile (behind the bearer gate)
// ============================================================================

/// GET /v1/auth/me
pub async fn profile<D, Q>(
    State(state): State<AuthAppState<D, Q>>,
    identity: AuthIdentity,
) -> AuthResult<Json<ProfileResponse>>
where
    D: UserDirectory + Send + Sync + 'static,
    Q: TaskQueue + Send + Sync + 'static,
{
    let use_case = ProfileUseCase::new(state.directory.clone());
    let output = use_case.execute(&identity.subject_id).await?;

    Ok(Json(ProfileResponse {
        user: UserResponse::from(&output.user),
        token_expires_at: identity.expires_at,
    }))
}

/// PATCH /v1/auth/me
pub async fn update_profile<D, Q>(
    State(state): State<AuthAppState<D, Q>>,
    identity: AuthIdentity,
    Json(req): Json<UpdateProfileRequest>,
) -> AuthResult<Json<ProfileResponse>>
where
    D: UserDirectory + Send + Sync + 'static,
    Q: TaskQueue + Send + Sync + 'static,
{
    let use_case = UpdateProfileUseCase::new(state.directory.clone(), state.config.clone());
    let user = use_case
        .execute(
            &identity.subject_id,
            UpdateProfileInput {
                first_name: req.first_name,
                last_name: req.last_name,
                password: req.password,
            },
        )
        .await?;

    Ok(Json(ProfileResponse {
        user: UserResponse::from(&user),
        token_expires_at: identity.expires_at,
    }))
}
