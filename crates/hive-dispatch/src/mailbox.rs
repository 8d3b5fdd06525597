//! Per-worker message queue

use std::time::Duration;

use tokio::sync::mpsc;

use hive_core::{Address, Envelope, HiveError, HiveResult};

/// Receiving end of one registered address. FIFO.
#[derive(Debug)]
pub struct Mailbox {
    address: Address,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Mailbox {
    pub(crate) fn new(address: Address, rx: mpsc::UnboundedReceiver<Envelope>) -> Self {
        Mailbox { address, rx }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Wait for the next envelope
    pub async fn next(&mut self) -> HiveResult<Envelope> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| HiveError::MailboxClosed(self.address.to_string()))
    }

    /// Wait up to `timeout` for the first envelope, then take everything
    /// else already queued. Empty on timeout.
    pub async fn next_many(&mut self, timeout: Duration) -> HiveResult<Vec<Envelope>> {
        let first = match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(None) => return Err(HiveError::MailboxClosed(self.address.to_string())),
            Ok(Some(envelope)) => envelope,
        };
        let mut batch = vec![first];
        batch.extend(self.drain());
        Ok(batch)
    }

    /// Everything queued right now, without waiting
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut batch = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            batch.push(envelope);
        }
        batch
    }

    /// The part of an envelope's destination below this mailbox's address
    pub fn rest_of(&self, envelope: &Envelope) -> Address {
        envelope
            .to
            .match_prefix(&self.address)
            .unwrap_or_else(Address::root)
    }
}
