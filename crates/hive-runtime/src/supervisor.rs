//! Worker supervision
//!
//! Every worker gets its own task. A run that errors, returns
//! `Finished`, or panics is logged and started again after the restart
//! delay; the worker value (and so its mailboxes) is reused. The first
//! run to return `Quit` stops the whole node.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use hive_dispatch::{Worker, WorkerExit};

pub struct Supervisor {
    workers: Vec<Box<dyn Worker>>,
    restart_delay: Duration,
}

impl Supervisor {
    pub fn new(restart_delay: Duration) -> Self {
        Supervisor {
            workers: Vec::new(),
            restart_delay,
        }
    }

    pub fn add(&mut self, worker: Box<dyn Worker>) {
        self.workers.push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Run every worker until one quits
    pub async fn run(self) {
        let (quit_tx, mut quit_rx) = watch::channel(false);
        let tasks: Vec<JoinHandle<()>> = self
            .workers
            .into_iter()
            .map(|worker| tokio::spawn(supervise(worker, self.restart_delay, quit_tx.clone())))
            .collect();
        drop(quit_tx);

        tracing::info!(workers = tasks.len(), "node running");
        // Err means every task ended without a quit; nothing left to wait for
        let _ = quit_rx.wait_for(|quit| *quit).await;

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!("node stopped");
    }
}

async fn supervise(mut worker: Box<dyn Worker>, restart_delay: Duration, quit: watch::Sender<bool>) {
    let name = worker.name();
    let span = tracing::info_span!("worker", role = %name);
    let mut runs: u64 = 0;
    loop {
        runs += 1;
        let outcome = AssertUnwindSafe(worker.run())
            .catch_unwind()
            .instrument(span.clone())
            .await;
        match outcome {
            Ok(Ok(WorkerExit::Quit)) => {
                tracing::info!(role = %name, "worker requested shutdown");
                let _ = quit.send(true);
                return;
            }
            Ok(Ok(WorkerExit::Finished)) => {
                tracing::error!(role = %name, runs, "worker returned unexpectedly");
            }
            Ok(Err(e)) => {
                tracing::error!(role = %name, runs, error = %e, "worker failed");
            }
            Err(_) => {
                tracing::error!(role = %name, runs, "worker panicked");
            }
        }
        tokio::time::sleep(restart_delay).await;
    }
}
