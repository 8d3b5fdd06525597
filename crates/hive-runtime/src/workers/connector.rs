//! Connector: dials peers and transport addresses others advertise

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use hive_content::SharedContentStore;
use hive_core::HiveResult;
use hive_dispatch::{Mailbox, Worker, WorkerExit};

use crate::workers::work_value;

pub struct Connector {
    index: usize,
    mailbox: Mailbox,
    content: SharedContentStore,
    timeout: Duration,
}

impl Connector {
    pub fn new(index: usize, mailbox: Mailbox, content: SharedContentStore, timeout: Duration) -> Self {
        Connector {
            index,
            mailbox,
            content,
            timeout,
        }
    }
}

#[async_trait]
impl Worker for Connector {
    fn name(&self) -> String {
        format!("connector/{}", self.index)
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        let mut connected: HashSet<String> = HashSet::new();
        loop {
            let envelope = self.mailbox.next().await?;
            let Some(target) = work_value(&envelope) else {
                continue;
            };
            if connected.contains(target) {
                continue;
            }
            match self.content.connect(target, self.timeout).await {
                Ok(()) => {
                    tracing::info!(target, "connected");
                    connected.insert(target.to_string());
                }
                Err(e) => tracing::debug!(target, error = %e, "connect failed"),
            }
        }
    }
}
