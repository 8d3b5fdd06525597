//! Workers the brain hands work to
//!
//! Each worker reads `Propose` work items from its own mailbox and reports
//! back to its node's brain. None of them touch the bucket store.

pub mod connector;
pub mod pinner;
pub mod summary_reader;
pub mod verifier;

pub use connector::*;
pub use pinner::*;
pub use summary_reader::*;
pub use verifier::*;

use std::future::Future;

use hive_content::ContentError;
use hive_core::{Address, Envelope, HiveResult, Message, PeerId};
use hive_dispatch::Dispatcher;

use crate::{RetryConfig, Role};

/// `/swarm/<peer>/<role>/<index>`, or `/swarm/<peer>/summary-reader`
pub fn worker_address(peer: &PeerId, role: Role, index: Option<usize>) -> Address {
    let base = Address::swarm(peer).child(role.segment());
    match index {
        Some(i) => base.child(i.to_string()),
        None => base,
    }
}

/// A worker's way back to the brain of its own node
#[derive(Clone)]
pub struct BrainLink {
    dispatcher: Dispatcher,
    from: Address,
}

impl BrainLink {
    /// `from` is relative to the node, e.g. `/verifier/0`
    pub fn new(dispatcher: &Dispatcher, from: Address) -> Self {
        BrainLink {
            dispatcher: dispatcher.with_prefix(dispatcher.node_address()),
            from,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.dispatcher.identity().peer_id()
    }

    pub fn send(&self, message: Message, sign: bool) -> HiveResult<()> {
        let envelope = Envelope::new(self.from.clone(), self.dispatcher.brain_address(), message);
        self.dispatcher.dispatch(envelope, sign)?;
        Ok(())
    }
}

/// The value carried by a work item
pub(crate) fn work_value(envelope: &Envelope) -> Option<&str> {
    match &envelope.contents {
        Message::Propose { value, .. } => Some(value.as_str()),
        _ => None,
    }
}

/// Run a content-store call, retrying timeouts and an unavailable store
/// with backoff. Any other error, or the last failure, is returned as is.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    hash: &str,
    mut call: F,
) -> Result<T, ContentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ContentError>>,
{
    let mut retry = 0;
    loop {
        match call().await {
            Err(e) if e.is_transient() && retry + 1 < policy.attempts => {
                let delay = policy.delay(retry);
                tracing::debug!(hash, error = %e, retry, ?delay, "content store call failed, retrying");
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use hive_content::{ContentError, ContentStore, MemoryContentStore, ObjectStat, Subscription};
    use hive_core::{Address, BucketPath, ContentHash, Envelope, Message, PeerId, Timestamp, Validity};
    use hive_crypto::Identity;
    use hive_dispatch::{Dispatcher, DispatcherBuilder, Mailbox};

    use crate::RetryConfig;

    pub fn quick_retry(attempts: u32) -> RetryConfig {
        RetryConfig {
            attempts,
            backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
        }
    }

    /// A memory store whose `describe` and `pin` time out for the first
    /// `failures` calls
    pub struct FlakyStore {
        pub inner: MemoryContentStore,
        failures: AtomicUsize,
        pub calls: AtomicUsize,
    }

    impl FlakyStore {
        pub fn new(failures: usize) -> Self {
            FlakyStore {
                inner: MemoryContentStore::standalone(PeerId::ZERO),
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            }
        }

        fn stumble(&self) -> Result<(), ContentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            match left {
                Ok(_) => Err(ContentError::Timeout(Duration::from_millis(1))),
                Err(_) => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ContentStore for FlakyStore {
        fn self_id(&self) -> PeerId {
            self.inner.self_id()
        }

        async fn put(&self, bytes: Vec<u8>) -> Result<ContentHash, ContentError> {
            self.inner.put(bytes).await
        }

        async fn get(&self, hash: &ContentHash, timeout: Duration) -> Result<Vec<u8>, ContentError> {
            self.inner.get(hash, timeout).await
        }

        async fn describe(&self, hash: &ContentHash) -> Result<ObjectStat, ContentError> {
            self.stumble()?;
            self.inner.describe(hash).await
        }

        async fn pin(&self, hash: &ContentHash, recursive: bool, timeout: Duration) -> Result<(), ContentError> {
            self.stumble()?;
            self.inner.pin(hash, recursive, timeout).await
        }

        async fn find_providers(&self, hash: &ContentHash, timeout: Duration) -> Result<Vec<PeerId>, ContentError> {
            self.inner.find_providers(hash, timeout).await
        }

        async fn connect(&self, address: &str, timeout: Duration) -> Result<(), ContentError> {
            self.inner.connect(address, timeout).await
        }

        async fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<(), ContentError> {
            self.inner.publish(topic, bytes).await
        }

        async fn subscribe(&self, topic: &str) -> Result<Subscription, ContentError> {
            self.inner.subscribe(topic).await
        }

        async fn known_addresses(&self) -> Result<Vec<String>, ContentError> {
            self.inner.known_addresses().await
        }
    }

    /// Dispatcher with a brain mailbox and one worker mailbox
    pub fn wiring(worker: &str) -> (Dispatcher, Mailbox, Mailbox) {
        let identity = Arc::new(Identity::generate());
        let node = Address::swarm(&identity.peer_id());
        let mut builder = DispatcherBuilder::new(identity);
        let brain = builder.register(node.child("brain")).unwrap();
        let inbox = builder
            .register(node.join(&Address::parse(worker).unwrap()))
            .unwrap();
        (builder.build(), brain, inbox)
    }

    pub fn work(dispatcher: &Dispatcher, to: &Address, bucket: &str, value: &str) {
        let item = Message::propose(
            BucketPath::parse(bucket).unwrap(),
            value,
            Validity::unbounded(Timestamp::now()),
        );
        dispatcher
            .dispatch(Envelope::new(Address::parse("/brain").unwrap(), to.clone(), item), false)
            .unwrap();
    }
}
