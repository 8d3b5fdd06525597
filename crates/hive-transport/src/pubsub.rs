//! Pub/sub transport over the content store's topics

use async_trait::async_trait;

use hive_content::SharedContentStore;
use hive_core::{Address, BucketPath, Envelope, HiveError, HiveResult, Message};
use hive_dispatch::{Dispatcher, Mailbox, Worker, WorkerExit};
use hive_wire::{decode_envelope, encode_envelope};

use crate::{deliver_inbound, Advertiser};

/// `/pubsub/<topic>`
pub fn pubsub_address(topic: &str) -> Address {
    Address::from_segments(["pubsub", topic])
}

/// Publishes everything in `/pubsub/<topic>`
pub struct PubSubWriter {
    topic: String,
    mailbox: Mailbox,
    dispatcher: Dispatcher,
    content: SharedContentStore,
    advertiser: Advertiser,
}

impl PubSubWriter {
    pub fn new(
        topic: impl Into<String>,
        mailbox: Mailbox,
        dispatcher: Dispatcher,
        content: SharedContentStore,
        advertiser: Advertiser,
    ) -> Self {
        PubSubWriter {
            topic: topic.into(),
            mailbox,
            dispatcher,
            content,
            advertiser,
        }
    }

    fn advertise(&self) -> HiveResult<()> {
        self.advertiser
            .advertise(BucketPath::new(["networks"]), format!("pubsub/{}", self.topic))
    }

    async fn publish(&self, envelope: &Envelope) {
        let bytes = match encode_envelope(envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(topic = %self.topic, error = %e, "dropping outbound envelope");
                return;
            }
        };
        if let Err(e) = self.content.publish(&self.topic, bytes).await {
            tracing::warn!(topic = %self.topic, error = %e, "publish failed");
        }
    }
}

#[async_trait]
impl Worker for PubSubWriter {
    fn name(&self) -> String {
        format!("pubsub-writer/{}", self.topic)
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        self.advertise()?;
        let mut readvertise = self.advertiser.schedule();

        let bootstrap = Envelope::new(
            self.dispatcher.brain_address(),
            Address::any_brain(),
            Message::Request {
                patterns: vec!["**".to_string()],
            },
        );
        self.publish(&bootstrap).await;

        loop {
            let envelope = self.mailbox.next().await?;
            let outbound = Envelope {
                to: self.mailbox.rest_of(&envelope),
                ..envelope
            };
            self.publish(&outbound).await;

            if readvertise.its_time() {
                self.advertise()?;
            }
        }
    }
}

/// Delivers messages published on a topic to local mailboxes
pub struct PubSubReader {
    topic: String,
    dispatcher: Dispatcher,
    content: SharedContentStore,
}

impl PubSubReader {
    /// `dispatcher` is the root handle; the reader adds its own prefix
    pub fn new(topic: impl Into<String>, dispatcher: &Dispatcher, content: SharedContentStore) -> Self {
        let topic = topic.into();
        PubSubReader {
            dispatcher: dispatcher.with_prefix(pubsub_address(&topic)),
            topic,
            content,
        }
    }
}

#[async_trait]
impl Worker for PubSubReader {
    fn name(&self) -> String {
        format!("pubsub-reader/{}", self.topic)
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        let mut subscription = self.content.subscribe(&self.topic).await?;
        tracing::info!(topic = %self.topic, "pub/sub reader subscribed");
        while let Some(bytes) = subscription.next().await {
            match decode_envelope(&bytes) {
                Ok(envelope) => {
                    deliver_inbound(&self.dispatcher, envelope, "pubsub");
                }
                Err(e) => tracing::warn!(topic = %self.topic, error = %e, "dropping malformed message"),
            }
        }
        Err(HiveError::TransportError(format!(
            "subscription to {} closed",
            self.topic
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use hive_content::MemoryNetwork;
    use hive_crypto::Identity;
    use hive_dispatch::DispatcherBuilder;

    const TEST_WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_topic_carries_envelopes_between_nodes() {
        let network = MemoryNetwork::new();

        let a_id = Arc::new(Identity::generate());
        let mut a_builder = DispatcherBuilder::new(a_id.clone());
        let mut a_brain = a_builder
            .register(Address::swarm(&a_id.peer_id()).child("brain"))
            .unwrap();
        let a_out = a_builder.register(pubsub_address("hive")).unwrap();
        let a_dispatcher = a_builder.build();
        let a_content: SharedContentStore = Arc::new(network.join(a_id.peer_id(), Vec::new()));

        let b_id = Arc::new(Identity::generate());
        let mut b_builder = DispatcherBuilder::new(b_id.clone());
        let mut b_brain = b_builder
            .register(Address::swarm(&b_id.peer_id()).child("brain"))
            .unwrap();
        let b_dispatcher = b_builder.build();
        let b_content: SharedContentStore = Arc::new(network.join(b_id.peer_id(), Vec::new()));

        let mut reader = PubSubReader::new("hive", &b_dispatcher, b_content);
        tokio::spawn(async move { reader.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let advertiser = Advertiser::new(&a_dispatcher, "pubsub-hive", Duration::from_secs(3600), Duration::from_secs(60));
        let mut writer = PubSubWriter::new("hive", a_out, a_dispatcher.clone(), a_content, advertiser);
        tokio::spawn(async move { writer.run().await });

        // The writer advertises its network locally
        let local = a_brain.next_many(TEST_WAIT).await.unwrap();
        let fact = local.iter().find(|e| e.contents.is_fact()).unwrap();
        assert_eq!(fact.contents.fact().unwrap().1, "pubsub/hive");

        // B receives the bootstrap request
        let bootstrap = tokio::time::timeout(TEST_WAIT, b_brain.next()).await.unwrap().unwrap();
        assert!(matches!(bootstrap.contents, Message::Request { .. }));
        assert!(bootstrap.from.starts_with(&pubsub_address("hive")));
    }
}
