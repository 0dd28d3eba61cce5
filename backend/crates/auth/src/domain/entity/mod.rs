//! Entity Module

pub mod email_verification;
pub mod user;
