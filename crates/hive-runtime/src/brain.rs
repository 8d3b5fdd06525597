//! Brain control loop
//!
//! The brain is the only owner of the bucket store. Every iteration it
//! fires whichever periodic tasks are due, waits briefly for mail, and
//! handles each envelope by kind:
//!
//! - `Ping` is answered with a signed `Pong`
//! - `Request` is answered with every matching fact, then `Pong`
//! - `Command` runs a local command (`quit`, `share`), then `Pong`
//! - facts and signatures are applied to the store and persisted
//!
//! Proposals applied along the way are queued by a store hook and routed
//! to the worker pools after each envelope.
//!
//! Everything built in [`Brain::run`] (store, snapshot handle, routing
//! state) lives for one run only. A restarted brain rebuilds its store
//! from the snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hive_content::SharedContentStore;
use hive_core::{
    Address, BucketPath, Envelope, ErrorClass, HiveError, HiveResult, Message, PeerId, Validity,
};
use hive_crypto::{sign_message, Identity};
use hive_dispatch::{Dispatcher, Mailbox, Worker, WorkerExit};
use hive_state::{maintenance_sweep, swarm_store, BucketStore, ProposalEvent, Snapshot};
use hive_time::{DoAtInterval, SharedClock};
use hive_transport::{pubsub_address, tcp_address};
use hive_wire::serialize_lines;

use crate::workers::worker_address;
use crate::{work_item, HookState, NodeConfig, Role, WorkerCounts};

/// Addresses of every worker the brain feeds, by role
#[derive(Clone, Debug, Default)]
pub struct WorkerPools {
    pub verifiers: Vec<Address>,
    pub pinners: Vec<Address>,
    pub connectors: Vec<Address>,
    pub summary_readers: Vec<Address>,
}

impl WorkerPools {
    pub fn for_node(peer: &PeerId, counts: &WorkerCounts) -> Self {
        let pool = |role: Role, n: usize| -> Vec<Address> {
            (0..n).map(|i| worker_address(peer, role, Some(i))).collect()
        };
        WorkerPools {
            verifiers: pool(Role::Verifier, counts.verifiers),
            pinners: pool(Role::Pinner, counts.pinners),
            connectors: pool(Role::Connector, counts.connectors),
            summary_readers: vec![worker_address(peer, Role::SummaryReader, None)],
        }
    }

    pub fn pool(&self, role: Role) -> &[Address] {
        match role {
            Role::Verifier => &self.verifiers,
            Role::Pinner => &self.pinners,
            Role::Connector => &self.connectors,
            Role::SummaryReader => &self.summary_readers,
        }
    }
}

/// Where rebroadcasts go: every brain behind every configured transport
pub fn gossip_channels(config: &NodeConfig) -> Vec<Address> {
    let mut channels = Vec::new();
    if !config.udp.is_empty() {
        channels.push(Address::from_segments(["udp", "*", "swarm", "*", "brain"]));
    }
    if !config.pubsub.is_empty() {
        channels.push(pubsub_address("*").join(&Address::any_brain()));
    }
    channels
}

struct Intervals {
    peer_advert: DoAtInterval,
    address_advert: DoAtInterval,
    connect_retry: DoAtInterval,
    summary_publish: DoAtInterval,
    rebroadcast: DoAtInterval,
    maintenance: DoAtInterval,
}

impl Intervals {
    fn new(config: &NodeConfig) -> Self {
        let periods = &config.intervals;
        Intervals {
            peer_advert: DoAtInterval::new(periods.peer_advert),
            address_advert: DoAtInterval::new(periods.address_advert),
            connect_retry: DoAtInterval::delayed(periods.connect_retry),
            summary_publish: DoAtInterval::delayed(periods.summary_publish),
            rebroadcast: DoAtInterval::new(periods.rebroadcast),
            maintenance: DoAtInterval::delayed(periods.maintenance),
        }
    }
}

/// State of one brain run
struct BrainRun {
    store: BucketStore,
    snapshot: Snapshot,
    hooks: HookState,
    events: mpsc::UnboundedReceiver<ProposalEvent>,
    intervals: Intervals,
    next_worker: HashMap<Role, usize>,
    last_summary: Option<String>,
}

pub struct Brain {
    mailbox: Mailbox,
    dispatcher: Dispatcher,
    content: SharedContentStore,
    clock: SharedClock,
    config: Arc<NodeConfig>,
    pools: WorkerPools,
    out_channels: Vec<Address>,
}

impl Brain {
    /// `dispatcher` is the root handle; the brain sends as `/swarm/<self>/brain`
    pub fn new(
        mailbox: Mailbox,
        dispatcher: &Dispatcher,
        content: SharedContentStore,
        clock: SharedClock,
        config: Arc<NodeConfig>,
        pools: WorkerPools,
    ) -> Self {
        Brain {
            mailbox,
            dispatcher: dispatcher.with_prefix(dispatcher.node_address()),
            out_channels: gossip_channels(&config),
            content,
            clock,
            config,
            pools,
        }
    }

    fn identity(&self) -> &Arc<Identity> {
        self.dispatcher.identity()
    }

    fn self_hex(&self) -> String {
        self.identity().peer_id().to_hex()
    }

    fn sender() -> Address {
        Address::from_segments(["brain"])
    }

    fn start(&self) -> HiveResult<BrainRun> {
        let mut store = swarm_store(self.clock.clone())?;
        let (tx, events) = mpsc::unbounded_channel();
        store.add_proposal_hook_all(Box::new(move |event: &ProposalEvent| {
            let _ = tx.send(event.clone());
        }));

        let snapshot = Snapshot::open(&self.config.data_dir)?;
        snapshot.replay(&mut store)?;
        maintenance_sweep(&mut store);

        tracing::info!(peer = %self.identity().peer_id().short(), "brain started");
        Ok(BrainRun {
            store,
            snapshot,
            hooks: HookState::new(self.identity().peer_id()),
            events,
            intervals: Intervals::new(&self.config),
            next_worker: HashMap::new(),
            last_summary: None,
        })
    }

    fn reply(&self, to: &Envelope, message: Message, sign: bool) {
        if let Err(e) = self.dispatcher.dispatch(to.reply(Self::sender(), message), sign) {
            tracing::warn!(to = %to.from, error = %e, "reply not delivered");
        }
    }

    /// Apply a fact or signature and persist what changed the store
    fn apply(&self, run: &mut BrainRun, message: &Message) {
        match run.store.process(message) {
            Ok(true) if message.is_fact() => self.persist(run, message),
            Ok(_) => {}
            Err(e) => match e.class() {
                ErrorClass::Store => tracing::debug!(kind = %message.kind(), error = %e, "message rejected"),
                _ => tracing::warn!(kind = %message.kind(), error = %e, "could not process message"),
            },
        }
    }

    fn persist(&self, run: &mut BrainRun, fact: &Message) {
        let signature = match run.store.signature_of(fact) {
            Ok(signature) => signature,
            Err(e) => {
                tracing::warn!(error = %e, "cannot hash fact for persistence");
                return;
            }
        };
        let result = signature
            .iter()
            .chain(std::iter::once(fact))
            .try_for_each(|m| run.snapshot.append(m));
        if let Err(e) = result {
            tracing::warn!(error = %e, "snapshot append failed");
        }
    }

    /// Sign and apply a fact of our own
    fn assert_fact(&self, run: &mut BrainRun, fact: Message) -> HiveResult<()> {
        let signature = sign_message(self.identity(), &fact)?;
        run.store.process(&signature)?;
        self.apply(run, &fact);
        Ok(())
    }

    fn send_work(&self, run: &mut BrainRun, role: Role, item: Message) -> HiveResult<()> {
        let pool = self.pools.pool(role);
        if pool.is_empty() {
            return Err(HiveError::NoRoute(format!("no {} workers", role.segment())));
        }
        let slot = run.next_worker.entry(role).or_insert(0);
        let to = pool[*slot % pool.len()].clone();
        *slot = slot.wrapping_add(1);
        self.dispatcher
            .dispatch(Envelope::new(Self::sender(), to, item), false)?;
        Ok(())
    }

    /// Route queued proposal events to workers
    fn drain_hooks(&self, run: &mut BrainRun) -> HiveResult<()> {
        while let Ok(event) = run.events.try_recv() {
            if let Some(role) = run.hooks.route(&event, &run.store) {
                tracing::debug!(bucket = %event.bucket, value = %event.data, role = role.segment(), "handing off");
                self.send_work(run, role, work_item(&event))?;
            }
        }
        Ok(())
    }

    /// Returns `Some` when the node should stop
    async fn handle(&self, run: &mut BrainRun, envelope: Envelope) -> HiveResult<Option<WorkerExit>> {
        match &envelope.contents {
            Message::Ping => self.reply(&envelope, Message::Pong, true),
            Message::Pong => {}
            Message::Request { patterns } => {
                for fact in run.store.matching(patterns) {
                    if let Some(signature) = run.store.signature_of(&fact)? {
                        self.reply(&envelope, signature, false);
                    }
                    self.reply(&envelope, fact, false);
                }
                self.reply(&envelope, Message::Pong, false);
            }
            Message::Command { name, params } => match name.as_str() {
                "quit" if self.may_quit(&envelope.from) => {
                    tracing::info!(from = %envelope.from, "quit requested");
                    self.reply(&envelope, Message::Pong, false);
                    tokio::time::sleep(self.config.quit_grace).await;
                    return Ok(Some(WorkerExit::Quit));
                }
                "quit" => {
                    tracing::warn!(from = %envelope.from, "ignoring quit from a remote peer");
                    self.reply(&envelope, Message::Pong, false);
                }
                "share" => {
                    match params.get("hash") {
                        Some(hash) => {
                            let now = self.clock.now();
                            tracing::info!(hash = %hash, "sharing");
                            let fact = Message::propose(BucketPath::new(["files"]), hash.clone(), Validity::unbounded(now));
                            self.assert_fact(run, fact)?;
                        }
                        None => tracing::warn!("share without a hash"),
                    }
                    self.reply(&envelope, Message::Pong, false);
                }
                other => {
                    tracing::warn!(command = other, "unknown command");
                    self.reply(&envelope, Message::Pong, false);
                }
            },
            Message::Signature { .. } | Message::Propose { .. } | Message::Dismiss { .. } => {
                self.apply(run, &envelope.contents);
            }
        }
        Ok(None)
    }

    /// Quit is authorised by origin, not by signature. Only envelopes that
    /// entered through the local control listener (`/tcp/...`) or were sent
    /// by this node's own workers may stop it. Remote peers reach the brain
    /// through `/udp` or `/pubsub` and are refused whatever they sign.
    fn may_quit(&self, from: &Address) -> bool {
        from.starts_with(&tcp_address()) || from.starts_with(&self.dispatcher.node_address())
    }

    async fn fire_intervals(&self, run: &mut BrainRun) -> HiveResult<()> {
        if run.intervals.peer_advert.its_time() {
            self.advertise_peer(run)?;
        }
        if run.intervals.address_advert.its_time() {
            self.advertise_addresses(run).await?;
        }
        if run.intervals.connect_retry.its_time() {
            self.retry_connections(run)?;
        }
        if run.intervals.summary_publish.its_time() {
            self.publish_summary(run).await?;
        }
        if run.intervals.rebroadcast.its_time() {
            self.rebroadcast(run);
        }
        if run.intervals.maintenance.its_time() {
            self.maintain(run);
        }
        Ok(())
    }

    fn advert(&self, bucket: BucketPath, value: impl Into<String>) -> Message {
        Message::propose(bucket, value, Validity::starting(self.clock.now(), self.config.advert_ttl))
    }

    fn own_bucket(&self, leaf: &str) -> BucketPath {
        BucketPath::new(["peer".to_string(), self.self_hex(), leaf.to_string()])
    }

    fn advertise_peer(&self, run: &mut BrainRun) -> HiveResult<()> {
        let fact = self.advert(BucketPath::new(["peer"]), self.self_hex());
        self.assert_fact(run, fact)
    }

    async fn advertise_addresses(&self, run: &mut BrainRun) -> HiveResult<()> {
        let store_id = self.content.self_id().to_hex();
        self.assert_fact(run, self.advert(self.own_bucket("store"), store_id))?;
        match self.content.known_addresses().await {
            Ok(addresses) => {
                for address in addresses {
                    self.assert_fact(run, self.advert(self.own_bucket("addresses"), address))?;
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not list content-store addresses"),
        }
        Ok(())
    }

    /// Hand every live peer and address to the connectors again
    fn retry_connections(&self, run: &mut BrainRun) -> HiveResult<()> {
        let me = self.self_hex();
        let peer = BucketPath::new(["peer"]);
        let mut targets: Vec<(BucketPath, String)> = run
            .store
            .query(&peer)
            .into_iter()
            .filter(|p| *p != me)
            .map(|p| (peer.clone(), p))
            .collect();
        for other in run.store.child_names(&peer) {
            if other == me {
                continue;
            }
            let bucket = peer.child(other).child("addresses");
            targets.extend(run.store.query(&bucket).into_iter().map(|a| (bucket.clone(), a)));
        }
        let now = self.clock.now();
        for (bucket, value) in targets {
            self.send_work(run, Role::Connector, Message::propose(bucket, value, Validity::unbounded(now)))?;
        }
        Ok(())
    }

    async fn publish_summary(&self, run: &mut BrainRun) -> HiveResult<()> {
        let facts = run.store.facts(&BucketPath::default(), false);
        if facts.is_empty() {
            return Ok(());
        }
        let text = serialize_lines(&facts)?;
        let hash = match self.content.put(text.into_bytes()).await {
            Ok(hash) => hash.into_string(),
            Err(e) => {
                tracing::warn!(error = %e, "summary not published");
                return Ok(());
            }
        };
        if run.last_summary.as_deref() != Some(hash.as_str()) {
            tracing::info!(hash = %hash, facts = facts.len(), "summary published");
        }
        let ttl = self.config.advert_ttl.max(self.config.intervals.summary_publish * 2);
        let fact = Message::propose(self.own_bucket("summary"), hash.clone(), Validity::starting(self.clock.now(), ttl));
        self.assert_fact(run, fact)?;
        run.last_summary = Some(hash);
        Ok(())
    }

    fn rebroadcast(&self, run: &mut BrainRun) {
        if self.out_channels.is_empty() {
            return;
        }
        let envelopes = run
            .store
            .rebroadcast(&BucketPath::default(), &self.out_channels, &Self::sender());
        let count = envelopes.len();
        for envelope in envelopes {
            if let Err(e) = self.dispatcher.dispatch(envelope, false) {
                tracing::warn!(error = %e, "rebroadcast not delivered");
            }
        }
        tracing::debug!(envelopes = count, "rebroadcast");
    }

    fn maintain(&self, run: &mut BrainRun) {
        let swept = maintenance_sweep(&mut run.store);
        let cleaned = run.store.cleanup();
        let live = run.store.all_facts();
        if let Err(e) = run.snapshot.compact(&live) {
            tracing::warn!(error = %e, "snapshot compaction failed");
        }
        tracing::debug!(
            swept,
            expired = cleaned.facts,
            signatures = cleaned.signatures,
            persisted = live.len(),
            "maintenance"
        );
    }
}

#[async_trait]
impl Worker for Brain {
    fn name(&self) -> String {
        "brain".to_string()
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        let mut run = self.start()?;
        self.drain_hooks(&mut run)?;
        loop {
            self.fire_intervals(&mut run).await?;
            self.drain_hooks(&mut run)?;

            // A quit still lets the rest of the batch through
            let mut exit = None;
            for envelope in self.mailbox.next_many(self.config.brain_poll).await? {
                if let Some(requested) = self.handle(&mut run, envelope).await? {
                    exit.get_or_insert(requested);
                }
                self.drain_hooks(&mut run)?;
            }
            if let Some(exit) = exit {
                run.snapshot.close()?;
                tracing::info!("brain stopped");
                return Ok(exit);
            }
        }
    }
}
