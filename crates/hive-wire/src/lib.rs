//! Hive Wire Protocol - message and envelope encoding
//!
//! This crate handles:
//! - Deterministic, versioned message serialization
//! - The JSON envelope carried by broadcast transports
//! - Newline-delimited message streams (snapshots, summaries)

pub mod codec;
pub mod envelope;

pub use codec::*;
pub use envelope::*;
