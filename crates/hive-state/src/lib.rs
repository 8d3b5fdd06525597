//! Hive State - the replicated bucket store
//!
//! This crate implements the store the brain owns:
//! - Bucket tree of (value, validity, signer) entries
//! - Propose / Dismiss reconciliation (dismiss wins ties)
//! - Proposal hooks
//! - Rebroadcast for anti-entropy
//! - Maintenance sweep over the file pipeline
//! - Append-only snapshot persistence

pub mod bucket;
pub mod maintenance;
pub mod snapshot;
pub mod store;

pub use bucket::*;
pub use maintenance::*;
pub use snapshot::*;
pub use store::*;
