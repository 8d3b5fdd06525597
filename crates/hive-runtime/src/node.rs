//! Node assembly
//!
//! Registers every mailbox, builds the dispatcher and hands one worker per
//! role to the supervisor:
//!
//! ```text
//! /swarm/<peer>/brain            brain
//! /swarm/<peer>/verifier/<i>     verifiers
//! /swarm/<peer>/pinner/<i>       pinners
//! /swarm/<peer>/connector/<i>    connectors
//! /swarm/<peer>/summary-reader   summary reader
//! /udp/<name>                    UDP broadcaster (listener has no mailbox)
//! /pubsub/<topic>                pub/sub writer (reader has no mailbox)
//! /tcp                           control listener
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use hive_content::SharedContentStore;
use hive_core::{Address, HiveResult, PeerId};
use hive_crypto::Identity;
use hive_dispatch::{Dispatcher, DispatcherBuilder};
use hive_time::SharedClock;
use hive_transport::{
    pubsub_address, tcp_address, Advertiser, PubSubReader, PubSubWriter, TcpControlListener,
    UdpBroadcaster, UdpListener,
};

use crate::{
    Brain, Connector, NodeConfig, Pinner, SummaryReader, Supervisor, Verifier, WorkerPools,
};

pub struct Node {
    peer: PeerId,
    dispatcher: Dispatcher,
    supervisor: Supervisor,
    control: Option<TcpControlListener>,
}

impl Node {
    pub fn build(
        config: NodeConfig,
        identity: Arc<Identity>,
        content: SharedContentStore,
        clock: SharedClock,
    ) -> HiveResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let peer = identity.peer_id();
        let pools = WorkerPools::for_node(&peer, &config.workers);
        let mut builder = DispatcherBuilder::new(identity);

        let brain_box = builder.register(Address::swarm(&peer).child("brain"))?;
        let verifier_boxes = pools
            .verifiers
            .iter()
            .map(|a| builder.register(a.clone()))
            .collect::<HiveResult<Vec<_>>>()?;
        let pinner_boxes = pools
            .pinners
            .iter()
            .map(|a| builder.register(a.clone()))
            .collect::<HiveResult<Vec<_>>>()?;
        let connector_boxes = pools
            .connectors
            .iter()
            .map(|a| builder.register(a.clone()))
            .collect::<HiveResult<Vec<_>>>()?;
        let reader_box = builder.register(pools.summary_readers[0].clone())?;
        let udp_boxes = config
            .udp
            .iter()
            .map(|u| builder.register(u.address()))
            .collect::<HiveResult<Vec<_>>>()?;
        let pubsub_boxes = config
            .pubsub
            .iter()
            .map(|t| builder.register(pubsub_address(t)))
            .collect::<HiveResult<Vec<_>>>()?;
        let tcp_box = match config.tcp {
            Some(_) => Some(builder.register(tcp_address())?),
            None => None,
        };
        let dispatcher = builder.build();

        let timeouts = &config.timeouts;
        let mut supervisor = Supervisor::new(config.restart_delay);
        supervisor.add(Box::new(Brain::new(
            brain_box,
            &dispatcher,
            content.clone(),
            clock.clone(),
            config.clone(),
            pools,
        )));
        for (i, mailbox) in verifier_boxes.into_iter().enumerate() {
            supervisor.add(Box::new(Verifier::new(
                i,
                mailbox,
                &dispatcher,
                content.clone(),
                clock.clone(),
                config.dismiss_ttl,
                config.retry.clone(),
            )));
        }
        for (i, mailbox) in pinner_boxes.into_iter().enumerate() {
            supervisor.add(Box::new(Pinner::new(
                i,
                mailbox,
                &dispatcher,
                content.clone(),
                clock.clone(),
                timeouts.pin,
                config.safe_ttl,
                config.retry.clone(),
            )));
        }
        for (i, mailbox) in connector_boxes.into_iter().enumerate() {
            supervisor.add(Box::new(Connector::new(i, mailbox, content.clone(), timeouts.connect)));
        }
        supervisor.add(Box::new(SummaryReader::new(
            reader_box,
            &dispatcher,
            content.clone(),
            timeouts.get,
        )));

        let period = config.intervals.address_advert;
        for (settings, mailbox) in config.udp.iter().zip(udp_boxes) {
            let role = format!("udp-{}", settings.name);
            let advertiser = Advertiser::new(&dispatcher, &role, period, config.advert_ttl);
            supervisor.add(Box::new(UdpListener::new(
                settings.clone(),
                &dispatcher,
                advertiser.clone(),
            )));
            supervisor.add(Box::new(UdpBroadcaster::new(
                settings.clone(),
                mailbox,
                dispatcher.clone(),
                advertiser,
            )));
        }
        for (topic, mailbox) in config.pubsub.iter().zip(pubsub_boxes) {
            let advertiser = Advertiser::new(&dispatcher, &format!("pubsub-{topic}"), period, config.advert_ttl);
            supervisor.add(Box::new(PubSubReader::new(topic.clone(), &dispatcher, content.clone())));
            supervisor.add(Box::new(PubSubWriter::new(
                topic.clone(),
                mailbox,
                dispatcher.clone(),
                content.clone(),
                advertiser,
            )));
        }

        let control = match (config.tcp, tcp_box) {
            (Some(bind), Some(mailbox)) => Some(TcpControlListener::new(bind, mailbox, &dispatcher)),
            _ => None,
        };

        tracing::info!(
            peer = %peer.short(),
            workers = supervisor.len() + usize::from(control.is_some()),
            "node assembled"
        );
        Ok(Node {
            peer,
            dispatcher,
            supervisor,
            control,
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Bind the control listener and start every worker
    pub async fn start(self) -> HiveResult<RunningNode> {
        let Node {
            peer,
            dispatcher,
            mut supervisor,
            control,
        } = self;

        let control_addr = match control {
            Some(mut listener) => {
                let addr = listener.bind().await?;
                supervisor.add(Box::new(listener));
                Some(addr)
            }
            None => None,
        };

        let task = tokio::spawn(supervisor.run());
        Ok(RunningNode {
            peer,
            control_addr,
            dispatcher,
            task,
        })
    }
}

/// A started node
pub struct RunningNode {
    peer: PeerId,
    control_addr: Option<SocketAddr>,
    dispatcher: Dispatcher,
    task: JoinHandle<()>,
}

impl RunningNode {
    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    /// Where the control listener actually bound
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_addr
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until a `quit` stops the node
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "supervisor task failed");
        }
    }

    /// Stop every worker without the brain's shutdown path
    pub async fn abort(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hive_content::MemoryContentStore;
    use hive_core::Message;
    use hive_time::SystemClock;
    use hive_transport::ControlClient;

    fn test_config(dir: &tempfile::TempDir) -> NodeConfig {
        NodeConfig {
            data_dir: dir.path().to_path_buf(),
            brain_poll: Duration::from_millis(20),
            quit_grace: Duration::from_millis(10),
            udp: Vec::new(),
            tcp: Some("127.0.0.1:0".parse().unwrap()),
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_node_answers_control_requests_and_quits() {
        let dir = tempfile::tempdir().unwrap();
        let identity = Arc::new(Identity::generate());
        let content = Arc::new(MemoryContentStore::standalone(identity.peer_id()));
        let node = Node::build(test_config(&dir), identity.clone(), content, SystemClock::shared()).unwrap();
        assert!(node
            .dispatcher()
            .registered()
            .contains(&Address::parse("/pubsub/hive").unwrap()));

        let running = node.start().await.unwrap();
        let addr = running.control_addr().unwrap();
        let mut client = ControlClient::connect(addr).await.unwrap();
        let wait = Duration::from_secs(2);

        let pong = client.request(Address::any_brain(), Message::Ping, wait).await.unwrap();
        assert!(matches!(pong.as_slice(), [Message::Signature { .. }]));

        let peers = client
            .request(Address::any_brain(), Message::Request { patterns: vec!["peer".into()] }, wait)
            .await
            .unwrap();
        let me = identity.peer_id().to_hex();
        assert!(peers.iter().any(|m| m.fact().map(|f| f.1) == Some(me.as_str())));

        client.request(Address::any_brain(), Message::command("quit"), wait).await.unwrap();
        tokio::time::timeout(wait, running.wait()).await.unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.workers.verifiers = 0;
        let identity = Arc::new(Identity::generate());
        let content = Arc::new(MemoryContentStore::standalone(identity.peer_id()));
        assert!(Node::build(config, identity, content, SystemClock::shared()).is_err());
    }
}
