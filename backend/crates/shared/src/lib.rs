//! Shared Kernel
//!
//! Vocabulary used by both the auth and task crates:
//! - [`error`]: error classification and its HTTP rendering
//! - [`id`]: typed identifiers for users, credentials and tasks
//!
//! Only things whose meaning is identical in every crate belong here.

pub mod error;
pub mod id;
