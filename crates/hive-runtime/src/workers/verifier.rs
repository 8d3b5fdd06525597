//! Verifier: decides whether a shared hash is worth pinning

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use hive_content::SharedContentStore;
use hive_core::{Address, BucketPath, ContentHash, HiveResult, Message, Validity};
use hive_dispatch::{Dispatcher, Mailbox, Worker, WorkerExit};
use hive_time::SharedClock;

use crate::workers::{with_retry, work_value, BrainLink};
use crate::RetryConfig;

pub struct Verifier {
    index: usize,
    mailbox: Mailbox,
    brain: BrainLink,
    content: SharedContentStore,
    clock: SharedClock,
    dismiss_ttl: Duration,
    retry: RetryConfig,
}

impl Verifier {
    pub fn new(
        index: usize,
        mailbox: Mailbox,
        dispatcher: &Dispatcher,
        content: SharedContentStore,
        clock: SharedClock,
        dismiss_ttl: Duration,
        retry: RetryConfig,
    ) -> Self {
        let from = Address::from_segments(["verifier".to_string(), index.to_string()]);
        Verifier {
            index,
            mailbox,
            brain: BrainLink::new(dispatcher, from),
            content,
            clock,
            dismiss_ttl,
            retry,
        }
    }

    /// Returns false when every attempt was inconclusive
    async fn verify(&self, hash: &str) -> HiveResult<bool> {
        let key = ContentHash::new(hash);
        let content = &self.content;
        let described = with_retry(&self.retry, hash, || content.describe(&key)).await;
        let now = self.clock.now();
        match described {
            Ok(stat) => {
                tracing::info!(hash, size = stat.size, "verified");
                let fact = Message::propose(BucketPath::new(["verified"]), hash, Validity::unbounded(now));
                self.brain.send(fact, true)?;
                Ok(true)
            }
            Err(e) if e.is_permanent() => {
                tracing::info!(hash, reason = %e, "dismissing file");
                let fact = Message::dismiss(
                    BucketPath::new(["files"]),
                    hash,
                    Validity::starting(now, self.dismiss_ttl),
                );
                self.brain.send(fact, true)?;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(hash, error = %e, attempts = self.retry.attempts, "verification inconclusive");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Worker for Verifier {
    fn name(&self) -> String {
        format!("verifier/{}", self.index)
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        let mut handled: HashSet<String> = HashSet::new();
        loop {
            let envelope = self.mailbox.next().await?;
            let Some(hash) = work_value(&envelope) else {
                tracing::debug!(kind = %envelope.contents.kind(), "ignoring non-work message");
                continue;
            };
            if !handled.insert(hash.to_string()) {
                continue;
            }
            if !self.verify(hash).await? {
                // Stays in `files` until the next brain run hands it out again
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

    const WAIT: Duration = Duration::from_millis(300);

    fn verifier(content: SharedContentStore, retry: RetryConfig) -> (Verifier, Dispatcher, Mailbox, Address) {
        let (dispatcher, brain, inbox) = wiring("/verifier/0");
        let to = inbox.address().clone();
        let verifier = Verifier::new(
            0,
            inbox,
            &dispatcher,
            content,
            SystemClock::shared(),
            Duration::from_secs(60),
            retry,
        );
        (verifier, dispatcher, brain, to)
    }

    #[tokio::test]
    async fn test_duplicate_work_is_verified_once() {
        let content = Arc::new(MemoryContentStore::standalone(PeerId::ZERO));
        let hash = content.put(b"a file".to_vec()).await.unwrap();
        let (mut verifier, dispatcher, mut brain, to) = verifier(content, quick_retry(1));

        work(&dispatcher, &to, "files", hash.as_str());
        work(&dispatcher, &to, "files", hash.as_str());
        tokio::spawn(async move { verifier.run().await });

        let mut replies = Vec::new();
        loop {
            let batch = brain.next_many(WAIT).await.unwrap();
            if batch.is_empty() {
                break;
            }
            replies.extend(batch);
        }
        let proposals: Vec<_> = replies
            .iter()
            .filter(|e| matches!(&e.contents, Message::Propose { bucket, .. } if bucket.to_string() == "verified"))
            .collect();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].from.segments().last().map(String::as_str), Some("0"));
        assert_eq!(replies.len(), 2, "one signature plus one proposal");
    }

    #[tokio::test]
    async fn test_missing_and_malformed_hashes_are_dismissed() {
        let content = Arc::new(MemoryContentStore::standalone(PeerId::ZERO));
        let (mut verifier, dispatcher, mut brain, to) = verifier(content, quick_retry(3));

        work(&dispatcher, &to, "files", hash_bytes(b"nobody has this").as_str());
        work(&dispatcher, &to, "files", "not-a-hash");
        tokio::spawn(async move { verifier.run().await });

        let mut dismissed = Vec::new();
        while dismissed.len() < 2 {
            let envelope = tokio::time::timeout(WAIT, brain.next()).await.unwrap().unwrap();
            if let Message::Dismiss { bucket, value, validity } = envelope.contents {
                assert_eq!(bucket, BucketPath::new(["files"]));
                assert!(validity.end.is_some());
                dismissed.push(value);
            }
        }
        assert!(dismissed.contains(&"not-a-hash".to_string()));
    }

    #[tokio::test]
    async fn test_timeouts_are_retried_until_verified() {
        let flaky = Arc::new(FlakyStore::new(2));
        let hash = flaky.inner.put(b"slow to describe".to_vec()).await.unwrap();
        let (mut verifier, dispatcher, mut brain, to) = verifier(flaky.clone(), quick_retry(3));

        work(&dispatcher, &to, "files", hash.as_str());
        tokio::spawn(async move { verifier.run().await });

        let verified = loop {
            let envelope = tokio::time::timeout(WAIT, brain.next()).await.unwrap().unwrap();
            if let Message::Propose { bucket, value, .. } = envelope.contents {
                break (bucket, value);
            }
        };
        assert_eq!(verified, (BucketPath::new(["verified"]), hash.as_str().to_string()));
        assert_eq!(flaky.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let flaky = Arc::new(FlakyStore::new(10));
        let hash = flaky.inner.put(b"never answers".to_vec()).await.unwrap();
        let (mut verifier, dispatcher, mut brain, to) = verifier(flaky.clone(), quick_retry(3));

        work(&dispatcher, &to, "files", hash.as_str());
        tokio::spawn(async move { verifier.run().await });

        // Inconclusive: neither verified nor dismissed
        assert!(brain.next_many(WAIT).await.unwrap().is_empty());
        assert_eq!(flaky.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
