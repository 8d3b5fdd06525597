//! Summary reader: pulls other peers' published state into our brain
//!
//! A summary is a content object holding one serialized message per line,
//! each fact preceded by its signature. The reader forwards the lines
//! unsigned; the brain only attributes facts whose signatures verify.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use hive_content::SharedContentStore;
use hive_core::{Address, ContentHash, ErrorClass, HiveResult, Message};
use hive_dispatch::{Dispatcher, Mailbox, Worker, WorkerExit};
use hive_wire::interpret_lines;

use crate::workers::{work_value, BrainLink};

pub struct SummaryReader {
    mailbox: Mailbox,
    brain: BrainLink,
    content: SharedContentStore,
    timeout: Duration,
}

impl SummaryReader {
    pub fn new(
        mailbox: Mailbox,
        dispatcher: &Dispatcher,
        content: SharedContentStore,
        timeout: Duration,
    ) -> Self {
        SummaryReader {
            mailbox,
            brain: BrainLink::new(dispatcher, Address::from_segments(["summary-reader"])),
            content,
            timeout,
        }
    }

    async fn read(&self, hash: &str) -> HiveResult<usize> {
        let bytes = self.content.get(&ContentHash::new(hash), self.timeout).await?;
        let text = String::from_utf8_lossy(&bytes);
        let mut forwarded = 0;
        for line in interpret_lines(&text) {
            match line {
                Ok(message @ (Message::Signature { .. } | Message::Propose { .. } | Message::Dismiss { .. })) => {
                    self.brain.send(message, false)?;
                    forwarded += 1;
                }
                Ok(other) => tracing::debug!(hash, kind = %other.kind(), "skipping summary line"),
                Err(e) => tracing::debug!(hash, error = %e, "malformed summary line"),
            }
        }
        Ok(forwarded)
    }
}

#[async_trait]
impl Worker for SummaryReader {
    fn name(&self) -> String {
        "summary-reader".to_string()
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        let mut seen: HashSet<String> = HashSet::new();
        loop {
            let envelope = self.mailbox.next().await?;
            let Some(hash) = work_value(&envelope) else {
                continue;
            };
            if !seen.insert(hash.to_string()) {
                continue;
            }
            match self.read(hash).await {
                Ok(forwarded) => tracing::debug!(hash, forwarded, "summary read"),
                Err(e) if matches!(e.class(), ErrorClass::Routing | ErrorClass::Fatal) => return Err(e),
                Err(e) => {
                    tracing::info!(hash, error = %e, "summary unavailable");
                    seen.remove(hash);
                }
            }
        }
    }
}
