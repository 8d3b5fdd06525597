//! Multi-node swarms
//!
//! Every node joins the same [`MemoryNetwork`] and gossips over one pub/sub
//! topic, so state only spreads the way it does between real peers:
//! rebroadcasts, adverts and published summaries.

use std::time::Duration;

use hive_content::MemoryNetwork;
use hive_core::{HiveError, HiveResult};

use crate::{TestNode, HARNESS_TOPIC};

pub struct SwarmHarness {
    network: MemoryNetwork,
    nodes: Vec<TestNode>,
}

impl SwarmHarness {
    pub async fn start(count: usize) -> HiveResult<Self> {
        let network = MemoryNetwork::new();
        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            nodes.push(TestNode::start(&network, vec![HARNESS_TOPIC.to_string()]).await?);
        }
        Ok(SwarmHarness { network, nodes })
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&mut self, index: usize) -> &mut TestNode {
        &mut self.nodes[index]
    }

    pub fn nodes(&mut self) -> impl Iterator<Item = &mut TestNode> {
        self.nodes.iter_mut()
    }

    /// Wait until every node's `bucket` passes `check`
    pub async fn converge<F>(&mut self, bucket: &str, timeout: Duration, check: F) -> HiveResult<bool>
    where
        F: Fn(&[String]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        for node in &mut self.nodes {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            if !node.wait_for(bucket, left, &check).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Quit every node
    pub async fn shutdown(self) -> HiveResult<()> {
        let mut failures = Vec::new();
        for node in self.nodes {
            if let Err(e) = node.quit().await {
                failures.push(e.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(HiveError::TransportError(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hive_content::ContentStore;
    use hive_core::{BucketPath, Message, Timestamp, Validity};
    use hive_crypto::Identity;

    const GOSSIP: Duration = Duration::from_secs(10);

    fn contains(value: String) -> impl Fn(&[String]) -> bool {
        move |values: &[String]| values.iter().any(|v| *v == value)
    }

    #[tokio::test]
    async fn test_peers_discover_each_other() {
        let mut swarm = SwarmHarness::start(3).await.unwrap();
        assert_eq!(swarm.len(), 3);
        let ids: Vec<String> = swarm.nodes().map(|n| n.peer_id().to_hex()).collect();
        for id in &ids {
            assert!(swarm.converge("peer", GOSSIP, contains(id.clone())).await.unwrap());
        }
        swarm.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_file_becomes_safe_everywhere() {
        let mut swarm = SwarmHarness::start(2).await.unwrap();
        let hash = swarm.node(0).content().put(b"swarm payload".to_vec()).await.unwrap();
        swarm.node(0).share(&hash).await.unwrap();

        assert!(swarm
            .converge("safe", GOSSIP, contains(hash.as_str().to_string()))
            .await
            .unwrap());
        // The sharer always pins; others may learn of `safe` before `files`
        assert!(swarm.node(0).content().is_pinned(&hash));
        swarm.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_dismissal_spreads() {
        let mut swarm = SwarmHarness::start(2).await.unwrap();
        let author = Identity::generate();
        let now = Timestamp::now();
        let bucket = BucketPath::new(["share"]);
        swarm
            .node(0)
            .inject_signed(&author, Message::propose(bucket.clone(), "rumour", Validity::unbounded(now)))
            .await
            .unwrap();
        assert!(swarm
            .converge("share", GOSSIP, contains("rumour".to_string()))
            .await
            .unwrap());

        let later = Timestamp(now.as_millis() + 1);
        swarm
            .node(0)
            .inject_signed(&author, Message::dismiss(bucket, "rumour", Validity::unbounded(later)))
            .await
            .unwrap();
        assert!(swarm
            .converge("share", GOSSIP, |values: &[String]| values.iter().all(|v| v != "rumour"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_summaries_are_published_and_read() {
        let mut swarm = SwarmHarness::start(2).await.unwrap();
        let publisher = swarm.node(0).peer_id().to_hex();
        let bucket = format!("peer/{publisher}/summary");
        assert!(swarm
            .node(1)
            .wait_for(&bucket, GOSSIP, |values: &[String]| !values.is_empty())
            .await
            .unwrap());
    }
}
