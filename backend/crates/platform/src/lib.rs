//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (random material, base64, AES-256-GCM sealing)
//! - Password hashing (Argon2id)

pub mod crypto;
pub mod password;
