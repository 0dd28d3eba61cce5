//! Application Layer
//!
//! Use cases and application services.

pub mod config;
pub mod profile;
pub mod sign_in;
pub mod sign_up;
pub mod update_profile;
pub mod verify_email;

// Re-exports
pub use config::AuthConfig;
pub use profile::{ProfileOutput, ProfileUseCase};
pub use sign_in::{SignInInput, SignInOutput, SignInUseCase};
pub use sign_up::{SignUpInput, SignUpOutput, SignUpUseCase};
pub use update_profile::{UpdateProfileInput, UpdateProfileUseCase};
pub use verify_email::{VerifyEmailInput, VerifyEmailUseCase};
