//! Hive Dispatch - the in-process message router
//!
//! Every worker owns one [`Mailbox`] registered at an [`Address`]. Workers
//! talk only by handing envelopes to a [`Dispatcher`], which delivers a copy
//! to every mailbox whose address is a prefix of the destination.
//!
//! Anything that runs as a supervised task implements [`Worker`].
//!
//! The route table is fixed when the node is assembled. Dispatch takes no
//! locks; a dispatcher handle is a cheap clone.
//!
//! [`Address`]: hive_core::Address

pub mod dispatcher;
pub mod mailbox;
pub mod worker;

pub use dispatcher::*;
pub use mailbox::*;
pub use worker::*;
