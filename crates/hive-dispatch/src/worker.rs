//! Worker contract

use async_trait::async_trait;

use hive_core::HiveResult;

/// How a worker run ended without an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// The node is shutting down
    Quit,
    /// The loop ended on its own; treated like a crash and restarted
    Finished,
}

/// A long-running role that owns one or more mailboxes.
///
/// `run` may be called again after it returns or panics, so per-run state
/// belongs in locals and long-lived resources (mailboxes, dispatcher) in
/// the struct.
#[async_trait]
pub trait Worker: Send {
    fn name(&self) -> String;

    async fn run(&mut self) -> HiveResult<WorkerExit>;
}
