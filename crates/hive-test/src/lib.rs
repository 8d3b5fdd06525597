//! Hive Test Harness - in-process swarms and gossip fuzzing
//!
//! This crate provides:
//! - A single node driven through its TCP control port
//! - Multi-node swarms sharing one in-memory content network
//! - Gossip convergence fuzzing of the bucket store

pub mod harness;
pub mod swarm;
pub mod gossip_fuzzer;

pub use harness::*;
pub use swarm::*;
pub use gossip_fuzzer::*;
