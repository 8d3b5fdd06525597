//! Hive Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the swarm node:
//! - Identifiers (PeerId, ContentHash)
//! - Routing addresses and prefix matching
//! - Validity windows
//! - Messages, envelopes and bucket paths
//! - The error taxonomy

pub mod address;
pub mod error;
pub mod id;
pub mod message;
pub mod time;

pub use address::*;
pub use error::*;
pub use id::*;
pub use message::*;
pub use time::*;
