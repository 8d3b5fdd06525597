//! Hive Crypto - peer identity and message signatures
//!
//! Provides:
//! - Identity management (Ed25519), PeerId derivation
//! - Content hashing of serialized messages
//! - Detached signatures and the signature index

pub mod identity;
pub mod signature;

pub use identity::*;
pub use signature::*;
