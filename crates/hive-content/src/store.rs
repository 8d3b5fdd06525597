//! The `ContentStore` capability

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use hive_core::{ContentHash, PeerId};

use crate::ContentError;

/// What kind of object a hash names
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Directory,
    /// Bytes with no file structure
    Raw,
}

/// Metadata returned by [`ContentStore::describe`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectStat {
    pub hash: ContentHash,
    pub size: u64,
    pub kind: ObjectKind,
}

/// Content-addressed storage, peer discovery and pub/sub.
///
/// Every call that may touch the network takes a timeout and fails with
/// [`ContentError::Timeout`] instead of blocking.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Identity of the local content peer
    fn self_id(&self) -> PeerId;

    /// Store bytes, returning their hash
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentHash, ContentError>;

    /// Fetch an object
    async fn get(&self, hash: &ContentHash, timeout: Duration) -> Result<Vec<u8>, ContentError>;

    /// Local metadata lookup, no peer lookup (the verifier's fast path)
    async fn describe(&self, hash: &ContentHash) -> Result<ObjectStat, ContentError>;

    /// Pin an object (and everything it links to, if `recursive`)
    async fn pin(
        &self,
        hash: &ContentHash,
        recursive: bool,
        timeout: Duration,
    ) -> Result<(), ContentError>;

    async fn find_providers(
        &self,
        hash: &ContentHash,
        timeout: Duration,
    ) -> Result<Vec<PeerId>, ContentError>;

    /// Dial a content peer by transport address
    async fn connect(&self, address: &str, timeout: Duration) -> Result<(), ContentError>;

    async fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<(), ContentError>;

    async fn subscribe(&self, topic: &str) -> Result<Subscription, ContentError>;

    /// Transport addresses this content peer is reachable at
    async fn known_addresses(&self) -> Result<Vec<String>, ContentError>;
}

/// Shared content-store handle
pub type SharedContentStore = Arc<dyn ContentStore>;

/// Messages published on one topic
pub struct Subscription {
    topic: String,
    rx: broadcast::Receiver<Vec<u8>>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, rx: broadcast::Receiver<Vec<u8>>) -> Self {
        Subscription {
            topic: topic.into(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the topic is gone. Messages missed
    /// while lagging are skipped.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.rx.recv().await {
                Ok(bytes) => return Some(bytes),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Hash of an object's bytes: lowercase hex SHA-256
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::new(hex::encode(Sha256::digest(bytes)))
}

/// True if `hash` has the shape of a [`hash_bytes`] output
pub fn is_well_formed_hash(hash: &ContentHash) -> bool {
    let s = hash.as_str();
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
