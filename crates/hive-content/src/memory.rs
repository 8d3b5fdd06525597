//! In-process content store
//!
//! A [`MemoryNetwork`] holds every object and pub/sub topic. Each
//! [`MemoryContentStore`] is one peer on it: `put` makes the peer a holder,
//! `get`/`pin` fetch from any holder, `describe` reads object metadata
//! without fetching. Every peer is reachable by its hex id as well as by
//! the addresses it joined with.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use hive_core::{ContentHash, PeerId};

use crate::{
    hash_bytes, is_well_formed_hash, ContentError, ContentStore, ObjectKind, ObjectStat,
    Subscription,
};

/// Poll period while waiting for an object to appear
const FETCH_POLL: Duration = Duration::from_millis(10);

/// Buffered messages per pub/sub topic
const TOPIC_CAPACITY: usize = 1024;

#[derive(Clone)]
struct StoredObject {
    bytes: Arc<Vec<u8>>,
    kind: ObjectKind,
}

#[derive(Default)]
struct NetworkState {
    objects: HashMap<ContentHash, StoredObject>,
    holders: HashMap<ContentHash, BTreeSet<PeerId>>,
    topics: HashMap<String, broadcast::Sender<Vec<u8>>>,
    addresses: HashMap<String, PeerId>,
}

/// Shared substrate for a set of in-process content peers
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<RwLock<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        MemoryNetwork::default()
    }

    /// Attach a new peer reachable at `addresses`
    pub fn join(&self, peer: PeerId, addresses: Vec<String>) -> MemoryContentStore {
        {
            let mut state = self.state.write();
            state.addresses.insert(peer.to_hex(), peer);
            for address in &addresses {
                state.addresses.insert(address.clone(), peer);
            }
        }
        MemoryContentStore {
            peer,
            addresses,
            network: self.clone(),
            local: RwLock::new(LocalState::default()),
        }
    }

    fn store(&self, peer: PeerId, bytes: Vec<u8>, kind: ObjectKind) -> ContentHash {
        let hash = hash_bytes(&bytes);
        let mut state = self.state.write();
        state.objects.entry(hash.clone()).or_insert(StoredObject {
            bytes: Arc::new(bytes),
            kind,
        });
        state.holders.entry(hash.clone()).or_default().insert(peer);
        hash
    }

    fn lookup(&self, hash: &ContentHash) -> Option<StoredObject> {
        self.state.read().objects.get(hash).cloned()
    }

    fn add_holder(&self, hash: &ContentHash, peer: PeerId) {
        self.state.write().holders.entry(hash.clone()).or_default().insert(peer);
    }

    fn topic(&self, name: &str) -> broadcast::Sender<Vec<u8>> {
        self.state
            .write()
            .topics
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

#[derive(Default)]
struct LocalState {
    held: HashSet<ContentHash>,
    pinned: HashSet<ContentHash>,
    connected: BTreeSet<PeerId>,
}

/// One peer on a [`MemoryNetwork`]
pub struct MemoryContentStore {
    peer: PeerId,
    addresses: Vec<String>,
    network: MemoryNetwork,
    local: RwLock<LocalState>,
}

impl MemoryContentStore {
    /// A store on its own private network
    pub fn standalone(peer: PeerId) -> Self {
        MemoryNetwork::new().join(peer, Vec::new())
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    /// Store bytes that have no file structure
    pub fn put_raw(&self, bytes: Vec<u8>) -> ContentHash {
        let hash = self.network.store(self.peer, bytes, ObjectKind::Raw);
        self.local.write().held.insert(hash.clone());
        hash
    }

    pub fn is_pinned(&self, hash: &ContentHash) -> bool {
        self.local.read().pinned.contains(hash)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.local.read().connected.iter().copied().collect()
    }

    /// Wait for the object to exist somewhere on the network
    async fn fetch(&self, hash: &ContentHash, timeout: Duration) -> Result<StoredObject, ContentError> {
        if !is_well_formed_hash(hash) {
            return Err(ContentError::InvalidHash(hash.to_string()));
        }
        let found = tokio::time::timeout(timeout, async {
            loop {
                if let Some(object) = self.network.lookup(hash) {
                    return object;
                }
                tokio::time::sleep(FETCH_POLL).await;
            }
        })
        .await
        .map_err(|_| ContentError::Timeout(timeout))?;

        if self.local.write().held.insert(hash.clone()) {
            self.network.add_holder(hash, self.peer);
        }
        Ok(found)
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    fn self_id(&self) -> PeerId {
        self.peer
    }

    async fn put(&self, bytes: Vec<u8>) -> Result<ContentHash, ContentError> {
        let hash = self.network.store(self.peer, bytes, ObjectKind::File);
        self.local.write().held.insert(hash.clone());
        Ok(hash)
    }

    async fn get(&self, hash: &ContentHash, timeout: Duration) -> Result<Vec<u8>, ContentError> {
        let object = self.fetch(hash, timeout).await?;
        Ok(object.bytes.as_ref().clone())
    }

    async fn describe(&self, hash: &ContentHash) -> Result<ObjectStat, ContentError> {
        if !is_well_formed_hash(hash) {
            return Err(ContentError::InvalidHash(hash.to_string()));
        }
        let object = self
            .network
            .lookup(hash)
            .ok_or_else(|| ContentError::NotFound(hash.to_string()))?;
        if object.kind == ObjectKind::Raw {
            return Err(ContentError::UnexpectedFormat(hash.to_string()));
        }
        Ok(ObjectStat {
            hash: hash.clone(),
            size: object.bytes.len() as u64,
            kind: object.kind,
        })
    }

    async fn pin(
        &self,
        hash: &ContentHash,
        _recursive: bool,
        timeout: Duration,
    ) -> Result<(), ContentError> {
        match self.fetch(hash, timeout).await {
            Ok(_) => {
                self.local.write().pinned.insert(hash.clone());
                Ok(())
            }
            Err(e) => {
                tracing::debug!(hash = %hash, error = %e, "pin failed");
                Err(ContentError::CouldNotPin(hash.to_string()))
            }
        }
    }

    async fn find_providers(
        &self,
        hash: &ContentHash,
        _timeout: Duration,
    ) -> Result<Vec<PeerId>, ContentError> {
        if !is_well_formed_hash(hash) {
            return Err(ContentError::InvalidHash(hash.to_string()));
        }
        let state = self.network.state.read();
        Ok(state
            .holders
            .get(hash)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn connect(&self, address: &str, _timeout: Duration) -> Result<(), ContentError> {
        let peer = self
            .network
            .state
            .read()
            .addresses
            .get(address)
            .copied()
            .ok_or_else(|| ContentError::Unreachable(address.to_string()))?;
        if peer != self.peer {
            self.local.write().connected.insert(peer);
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<(), ContentError> {
        // No subscribers is not an error
        let _ = self.network.topic(topic).send(bytes);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, ContentError> {
        Ok(Subscription::new(topic, self.network.topic(topic).subscribe()))
    }

    async fn known_addresses(&self) -> Result<Vec<String>, ContentError> {
        Ok(self.addresses.clone())
    }
}
