//! Hive Runtime - node orchestration
//!
//! This crate assembles a swarm node:
//! - Brain: owns the bucket store and runs the control loop
//! - Workers: verifier, pinner, connector, summary reader
//! - Transports from `hive-transport`
//! - Supervisor restarting anything that fails
//!
//! Workers never touch the store. They reply to the brain with signed
//! Propose/Dismiss envelopes and the brain applies them.

pub mod brain;
pub mod config;
pub mod hooks;
pub mod logging;
pub mod node;
pub mod supervisor;
pub mod workers;

pub use brain::*;
pub use config::*;
pub use hooks::*;
pub use logging::*;
pub use node::*;
pub use supervisor::*;
pub use workers::*;
