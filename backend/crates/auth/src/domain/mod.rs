//! Domain Layer
//!
//! Contains entities, value objects, the credential model and repository traits.

pub mod credential;
pub mod entity;
pub mod repository;
pub mod value_object;

// Re-exports
pub use credential::{CredentialPayload, TokenError, TokenIssuer, TokenVerifier};
pub use entity::{email_verification::EmailVerification, user::User};
pub use repository::{DirectoryError, DirectoryResult, UserDirectory};
