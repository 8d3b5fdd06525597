//! Hive Transport - moving envelopes between nodes
//!
//! This crate provides:
//! - UDP broadcaster / listener pair per network interface
//! - Pub/sub writer / reader pair per content-store topic
//! - TCP control listener and the matching client
//!
//! Each outbound half owns a mailbox such as `/udp/<name>`; whatever is
//! dispatched below that address is sent with the remainder as its
//! destination. Each inbound half hands decoded envelopes to the local
//! dispatcher with its own prefix prepended to the sender, so replies find
//! their way back out through the same transport.

pub mod advert;
pub mod pubsub;
pub mod tcp;
pub mod udp;

pub use advert::*;
pub use pubsub::*;
pub use tcp::*;
pub use udp::*;
