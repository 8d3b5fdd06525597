//! Hive Content - the content-addressed store boundary
//!
//! The node never stores objects itself. Everything object-shaped (files,
//! pins, published summaries, peer discovery, pub/sub topics) goes through
//! the [`ContentStore`] capability.
//!
//! [`MemoryContentStore`] is a complete in-process implementation: several
//! stores attached to one [`MemoryNetwork`] behave like peers sharing a
//! content network.

pub mod error;
pub mod memory;
pub mod store;

pub use error::*;
pub use memory::*;
pub use store::*;
