//! Pinner: keeps verified files in the local content store

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use hive_content::SharedContentStore;
use hive_core::{Address, BucketPath, ContentHash, HiveResult, Message, Validity};
use hive_dispatch::{Dispatcher, Mailbox, Worker, WorkerExit};
use hive_time::SharedClock;

use crate::workers::{with_retry, work_value, BrainLink};
use crate::RetryConfig;

pub struct Pinner {
    index: usize,
    mailbox: Mailbox,
    brain: BrainLink,
    content: SharedContentStore,
    clock: SharedClock,
    pin_timeout: Duration,
    safe_ttl: Duration,
    retry: RetryConfig,
}

impl Pinner {
    pub fn new(
        index: usize,
        mailbox: Mailbox,
        dispatcher: &Dispatcher,
        content: SharedContentStore,
        clock: SharedClock,
        pin_timeout: Duration,
        safe_ttl: Duration,
        retry: RetryConfig,
    ) -> Self {
        let from = Address::from_segments(["pinner".to_string(), index.to_string()]);
        Pinner {
            index,
            mailbox,
            brain: BrainLink::new(dispatcher, from),
            content,
            clock,
            pin_timeout,
            safe_ttl,
            retry,
        }
    }

    /// Returns false when every attempt failed
    async fn pin(&self, hash: &str) -> HiveResult<bool> {
        let key = ContentHash::new(hash);
        let content = &self.content;
        let pinned = with_retry(&self.retry, hash, || content.pin(&key, true, self.pin_timeout)).await;
        match pinned {
            Ok(()) => {
                tracing::info!(hash, "pinned");
                let validity = Validity::starting(self.clock.now(), self.safe_ttl);
                self.brain
                    .send(Message::propose(BucketPath::new(["safe"]), hash, validity), true)?;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(hash, error = %e, attempts = self.retry.attempts, "pin failed");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Worker for Pinner {
    fn name(&self) -> String {
        format!("pinner/{}", self.index)
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        let mut handled: HashSet<String> = HashSet::new();
        loop {
            let envelope = self.mailbox.next().await?;
            let Some(hash) = work_value(&envelope) else {
                continue;
            };
            if !handled.insert(hash.to_string()) {
                continue;
            }
            if !self.pin(hash).await? {
                // Stays in `verified` until the next brain run hands it out again
                handled.remove(hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hive_content::{hash_bytes, ContentStore, MemoryContentStore};
    use hive_core::PeerId;
    use hive_time::SystemClock;

    use crate::workers::test_support::{quick_retry, wiring, work, FlakyStore};

    fn pinner(content: SharedContentStore, retry: RetryConfig) -> (Pinner, Dispatcher, Mailbox, Address) {
        let (dispatcher, brain, inbox) = wiring("/pinner/1");
        let to = inbox.address().clone();
        let pinner = Pinner::new(
            1,
            inbox,
            &dispatcher,
            content,
            SystemClock::shared(),
            Duration::from_millis(50),
            Duration::from_secs(7 * 24 * 3600),
            retry,
        );
        (pinner, dispatcher, brain, to)
    }

    #[tokio::test]
    async fn test_pin_reports_safe() {
        let content = Arc::new(MemoryContentStore::standalone(PeerId::ZERO));
        let hash = content.put(b"keep me".to_vec()).await.unwrap();
        let (mut pinner, dispatcher, mut brain, to) = pinner(content.clone(), quick_retry(1));

        work(&dispatcher, &to, "verified", hash.as_str());
        tokio::spawn(async move { pinner.run().await });

        let mut replies = brain.next_many(Duration::from_secs(1)).await.unwrap();
        replies.extend(brain.next_many(Duration::from_millis(100)).await.unwrap());
        assert!(matches!(replies[0].contents, Message::Signature { .. }));

        let safe = replies
            .iter()
            .find_map(|e| match &e.contents {
                Message::Propose { bucket, value, validity } if bucket.to_string() == "safe" => {
                    Some((value.clone(), *validity))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(safe.0, hash.as_str());
        assert!(safe.1.end.is_some());
        assert!(content.is_pinned(&hash));
    }

    #[tokio::test]
    async fn test_failed_pin_sends_nothing() {
        let content = Arc::new(MemoryContentStore::standalone(PeerId::ZERO));
        let (mut pinner, dispatcher, mut brain, to) = pinner(content, quick_retry(2));

        work(&dispatcher, &to, "verified", hash_bytes(b"unreachable").as_str());
        tokio::spawn(async move { pinner.run().await });

        let batch = brain.next_many(Duration::from_millis(200)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_pin_timeout_is_retried() {
        let flaky = Arc::new(FlakyStore::new(1));
        let hash = flaky.inner.put(b"pinned on the second try".to_vec()).await.unwrap();
        let (mut pinner, dispatcher, mut brain, to) = pinner(flaky.clone(), quick_retry(3));

        work(&dispatcher, &to, "verified", hash.as_str());
        tokio::spawn(async move { pinner.run().await });

        let safe = loop {
            let envelope = tokio::time::timeout(Duration::from_secs(1), brain.next())
                .await
                .unwrap()
                .unwrap();
            if let Message::Propose { bucket, value, .. } = envelope.contents {
                break (bucket, value);
            }
        };
        assert_eq!(safe, (BucketPath::new(["safe"]), hash.as_str().to_string()));
        assert!(flaky.inner.is_pinned(&hash));
    }
}
