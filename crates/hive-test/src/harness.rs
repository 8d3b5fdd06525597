//! Single-node harness
//!
//! Runs a complete node (brain, workers, pub/sub transport and control
//! listener) on a [`MemoryNetwork`] with every interval shortened to
//! fractions of a second, and talks to it the way `hived` does: over the
//! TCP control port.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use hive_content::{MemoryContentStore, MemoryNetwork};
use hive_core::{Address, ContentHash, Envelope, HiveError, HiveResult, Message, MessageKind, PeerId};
use hive_crypto::{sign_message, Identity};
use hive_runtime::{
    IntervalConfig, Node, NodeConfig, RetryConfig, RunningNode, TimeoutConfig, WorkerCounts,
};
use hive_time::SystemClock;
use hive_transport::ControlClient;

/// Pub/sub topic harness nodes gossip on
pub const HARNESS_TOPIC: &str = "hive-test";

/// How long a single control request may take
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const POLL: Duration = Duration::from_millis(25);

/// Node settings tuned so a full pipeline cycle takes about a second while
/// leaving an unoptimised build room to keep up with gossip
pub fn harness_config(data_dir: &Path, pubsub: Vec<String>) -> NodeConfig {
    NodeConfig {
        data_dir: data_dir.to_path_buf(),
        intervals: IntervalConfig {
            peer_advert: Duration::from_millis(250),
            address_advert: Duration::from_millis(500),
            connect_retry: Duration::from_secs(1),
            summary_publish: Duration::from_millis(600),
            rebroadcast: Duration::from_millis(400),
            maintenance: Duration::from_millis(250),
        },
        brain_poll: Duration::from_millis(20),
        quit_grace: Duration::from_millis(10),
        advert_ttl: Duration::from_secs(5),
        timeouts: TimeoutConfig {
            get: Duration::from_millis(500),
            pin: Duration::from_millis(500),
            connect: Duration::from_millis(200),
        },
        retry: RetryConfig {
            attempts: 3,
            backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(400),
        },
        workers: WorkerCounts {
            pinners: 1,
            verifiers: 2,
            connectors: 1,
        },
        udp: Vec::new(),
        pubsub,
        tcp: Some(std::net::SocketAddr::from(([127, 0, 0, 1], 0))),
        restart_delay: Duration::from_millis(50),
        ..NodeConfig::default()
    }
}

/// A running node plus a control connection to it
pub struct TestNode {
    peer: PeerId,
    content: Arc<MemoryContentStore>,
    client: ControlClient,
    running: RunningNode,
    _dir: TempDir,
}

impl TestNode {
    /// Start a node on `network`, gossiping on the given pub/sub topics
    pub async fn start(network: &MemoryNetwork, pubsub: Vec<String>) -> HiveResult<Self> {
        let dir = tempfile::tempdir()?;
        let identity = Arc::new(Identity::generate());
        let peer = identity.peer_id();
        let content = Arc::new(network.join(peer, vec![format!("mem://{}", peer.short())]));

        let config = harness_config(dir.path(), pubsub);
        let node = Node::build(config, identity, content.clone(), SystemClock::shared())?;
        let running = node.start().await?;
        let addr = running
            .control_addr()
            .ok_or_else(|| HiveError::Config("control listener disabled".into()))?;
        let client = ControlClient::connect(addr).await?;

        Ok(TestNode {
            peer,
            content,
            client,
            running,
            _dir: dir,
        })
    }

    /// A node alone on its own network, without gossip
    pub async fn standalone() -> HiveResult<Self> {
        TestNode::start(&MemoryNetwork::new(), Vec::new()).await
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    /// The node's content peer
    pub fn content(&self) -> &Arc<MemoryContentStore> {
        &self.content
    }

    pub fn is_stopped(&self) -> bool {
        self.running.is_finished()
    }

    pub async fn request(&mut self, message: Message) -> HiveResult<Vec<Message>> {
        self.client.request(Address::any_brain(), message, REPLY_TIMEOUT).await
    }

    pub async fn ping(&mut self) -> HiveResult<Vec<Message>> {
        self.request(Message::Ping).await
    }

    pub async fn share(&mut self, hash: &ContentHash) -> HiveResult<()> {
        self.request(Message::command("share").with_param("hash", hash.as_str()))
            .await
            .map(|_| ())
    }

    /// Hand a fact to the brain as if it arrived from a client
    pub async fn inject(&mut self, fact: Message) -> HiveResult<()> {
        self.client
            .send(&Envelope::new(Address::root(), Address::any_brain(), fact))
            .await
    }

    /// `inject` preceded by a signature from `signer`
    pub async fn inject_signed(&mut self, signer: &Identity, fact: Message) -> HiveResult<()> {
        let signature = sign_message(signer, &fact)?;
        self.inject(signature).await?;
        self.inject(fact).await
    }

    /// Live values of exactly `bucket`
    pub async fn values(&mut self, bucket: &str) -> HiveResult<Vec<String>> {
        let facts = self
            .request(Message::Request {
                patterns: vec![bucket.to_string()],
            })
            .await?;
        Ok(facts
            .iter()
            .filter(|m| m.kind() == MessageKind::Propose)
            .filter_map(|m| m.fact())
            .filter(|(path, _, _)| path.to_string() == bucket)
            .map(|(_, value, _)| value.to_string())
            .collect())
    }

    pub async fn holds(&mut self, bucket: &str, value: &str) -> HiveResult<bool> {
        Ok(self.values(bucket).await?.iter().any(|v| v == value))
    }

    /// Poll until `check` accepts the live values of `bucket`.
    /// Returns false if `timeout` passes first.
    pub async fn wait_for<F>(&mut self, bucket: &str, timeout: Duration, check: F) -> HiveResult<bool>
    where
        F: Fn(&[String]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check(self.values(bucket).await?.as_slice()) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Send `quit` and wait for the node to stop
    pub async fn quit(mut self) -> HiveResult<()> {
        self.request(Message::command("quit")).await?;
        tokio::time::timeout(REPLY_TIMEOUT, self.running.wait())
            .await
            .map_err(|_| HiveError::Timeout(REPLY_TIMEOUT))
    }
}
