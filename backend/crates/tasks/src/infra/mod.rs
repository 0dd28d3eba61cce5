//! Infrastructure Layer
//!
//! Broker implementations.

pub mod memory;
pub mod redis;
