//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, credential model, repository traits
//! - `application/` - Use cases and application services
//! - `infra/` - PostgreSQL directory and AEAD token maker
//! - `presentation/` - HTTP handlers, DTOs, bearer gate, router
//!
//! ## Features
//! - Email + password sign-up with a queued verification email
//! - Sign-in issuing stateless, encrypted access tokens
//! - `Authorization: Bearer` gate for protected routes
//!
//! ## Security Model
//! - Passwords hashed with Argon2id, optional application pepper
//! - Tokens sealed with AES-256-GCM; any tampering fails verification
//! - Forged and expired tokens produce the same 401

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use domain::credential::{CredentialPayload, TokenError, TokenIssuer, TokenVerifier};
pub use error::{AuthError, AuthResult};
pub use infra::{postgres::PgUserDirectory, token::AeadTokenMaker};
pub use presentation::{AuthAppState, AuthIdentity, auth_router};
