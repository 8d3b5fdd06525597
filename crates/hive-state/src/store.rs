//! Replicated bucket store
//!
//! Reconciliation rules, applied identically on every node so that delivery
//! order does not matter:
//! - Reproposing a `(path, value)` with a later end extends its window.
//! - A Dismiss removes the entry when its start is at or after the entry's
//!   latest proposal start, and is itself kept until its window ends.
//! - A Propose is ignored while a live Dismiss starts at or after it.
//!
//! Starts are compared as logical times, `min(start, now)`. A fact dated
//! ahead of the local clock counts as asserted now, so a Dismiss starting
//! now always beats a currently held entry.

use std::collections::HashSet;
use std::time::Duration;

use hive_core::{
    Address, BucketPath, ContentHash, Envelope, HiveError, HiveResult, Message, PeerId, Timestamp,
    Validity,
};
use hive_crypto::{message_hash, SignatureIndex};
use hive_time::SharedClock;

use crate::{Bucket, BucketEntry, Dismissal, SummaryNode};

/// Root bucket whose subtree is never gossiped nor served to requests
pub const PRIVATE_BUCKET: &str = "private";

/// Unreferenced signatures are kept this long, so a signature that arrives
/// just before its fact is not pruned in between
pub const SIGNATURE_GRACE: Duration = Duration::from_secs(60);

/// Delivered to proposal hooks after every applied proposal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalEvent {
    pub bucket: BucketPath,
    pub data: String,
    pub validity: Validity,
    pub proposed_by: Option<PeerId>,
}

/// Proposal callback
pub type ProposalHook = Box<dyn FnMut(&ProposalEvent) + Send>;

struct HookRegistration {
    prefix: Option<BucketPath>,
    callback: ProposalHook,
}

/// Result of cleanup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupResult {
    pub facts: usize,
    pub signatures: usize,
}

/// Replicated bucket store
pub struct BucketStore {
    root: Bucket,
    signatures: SignatureIndex,
    hooks: Vec<HookRegistration>,
    clock: SharedClock,
}

impl BucketStore {
    pub fn new(clock: SharedClock) -> Self {
        BucketStore {
            root: Bucket::new(),
            signatures: SignatureIndex::new(),
            hooks: Vec::new(),
            clock,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn root(&self) -> &Bucket {
        &self.root
    }

    pub fn signatures(&self) -> &SignatureIndex {
        &self.signatures
    }

    /// Create a bucket (and its ancestors) if missing
    pub fn init_bucket(&mut self, path: &BucketPath) -> HiveResult<()> {
        path.validate()?;
        self.root.descend_mut(path.segments());
        Ok(())
    }

    pub fn bucket(&self, path: &BucketPath) -> Option<&Bucket> {
        self.root.descend(path.segments())
    }

    pub fn add_proposal_hook(&mut self, path: BucketPath, callback: ProposalHook) {
        self.hooks.push(HookRegistration {
            prefix: Some(path),
            callback,
        });
    }

    pub fn add_proposal_hook_all(&mut self, callback: ProposalHook) {
        self.hooks.push(HookRegistration {
            prefix: None,
            callback,
        });
    }

    /// Parse a raw message line
    pub fn interpret_message(&self, raw: &str) -> HiveResult<Message> {
        hive_wire::interpret_message(raw)
    }

    /// Local proposal. Returns whether the store changed.
    pub fn propose(
        &mut self,
        path: &BucketPath,
        value: &str,
        validity: Validity,
        signer: Option<PeerId>,
    ) -> HiveResult<bool> {
        let origin = Message::propose(path.clone(), value, validity);
        let hash = message_hash(&origin)?;
        self.apply_propose(origin, hash, signer)
    }

    /// Local dismissal. Returns whether the store changed.
    pub fn dismiss(&mut self, path: &BucketPath, value: &str, validity: Validity) -> HiveResult<bool> {
        let origin = Message::dismiss(path.clone(), value, validity);
        let hash = message_hash(&origin)?;
        self.apply_dismiss(origin, hash, None)
    }

    /// Apply a message received from anywhere. Signatures are verified and
    /// indexed; facts are attributed to the signer of their content hash.
    pub fn process(&mut self, message: &Message) -> HiveResult<bool> {
        match message {
            Message::Signature { .. } => {
                let now = self.now();
                self.signatures.insert(message, now).map(|_| true)
            }
            Message::Propose { .. } => {
                let hash = message_hash(message)?;
                let signer = self.signatures.signer(&hash);
                self.apply_propose(message.clone(), hash, signer)
            }
            Message::Dismiss { .. } => {
                let hash = message_hash(message)?;
                let signer = self.signatures.signer(&hash);
                self.apply_dismiss(message.clone(), hash, signer)
            }
            other => Err(HiveError::ProcessFailure(format!(
                "cannot apply a {} message to the bucket store",
                other.kind()
            ))),
        }
    }

    fn apply_propose(
        &mut self,
        origin: Message,
        hash: ContentHash,
        signer: Option<PeerId>,
    ) -> HiveResult<bool> {
        let Some((path, value, validity)) = origin.fact() else {
            return Err(HiveError::ProcessFailure("not a proposal".into()));
        };
        let (path, value, validity) = (path.clone(), value.to_string(), *validity);
        path.validate()?;
        if !validity.is_well_formed() {
            return Err(HiveError::ProcessFailure(format!(
                "malformed validity {validity} for {path}"
            )));
        }

        let now = self.now();
        if validity.is_expired(now) {
            return Ok(false);
        }
        let asserted = validity.start.min(now);

        let node = self.root.descend_mut(path.segments());

        if let Some(dismissal) = node.dismissals.get(&value) {
            if dismissal.is_live(now) && dismissal.validity.start.min(now) >= asserted {
                tracing::trace!(bucket = %path, value = %value, "proposal shadowed by dismissal");
                return Ok(false);
            }
            node.dismissals.remove(&value);
        }

        let applied = match node.entries.get_mut(&value) {
            Some(entry) if !entry.validity.is_expired(now) => {
                // A repeat that adds no lifetime still counts as a newer assertion
                entry.latest = entry.latest.max(asserted);
                if !validity.ends_after(&entry.validity) {
                    false
                } else {
                    entry.validity = entry.validity.merge(&validity);
                    entry.proposed_by = signer.or(entry.proposed_by);
                    entry.origin = origin;
                    entry.origin_hash = hash;
                    true
                }
            }
            _ => {
                node.entries.insert(
                    value.clone(),
                    BucketEntry {
                        value: value.clone(),
                        validity,
                        proposed_by: signer,
                        latest: asserted,
                        origin,
                        origin_hash: hash,
                    },
                );
                true
            }
        };

        if applied {
            let event = ProposalEvent {
                bucket: path,
                data: value,
                validity,
                proposed_by: signer,
            };
            self.fire_hooks(&event);
        }
        Ok(applied)
    }

    fn apply_dismiss(
        &mut self,
        origin: Message,
        hash: ContentHash,
        signer: Option<PeerId>,
    ) -> HiveResult<bool> {
        let Some((path, value, validity)) = origin.fact() else {
            return Err(HiveError::ProcessFailure("not a dismissal".into()));
        };
        let (path, value, validity) = (path.clone(), value.to_string(), *validity);
        path.validate()?;
        if !validity.is_well_formed() {
            return Err(HiveError::ProcessFailure(format!(
                "malformed validity {validity} for {path}"
            )));
        }

        let now = self.now();
        if validity.is_expired(now) {
            return Ok(false);
        }

        let node = self.root.descend_mut(path.segments());

        let mut changed = false;
        match node.entries.get(&value) {
            Some(entry) if !entry.validity.is_expired(now) && entry.latest > validity.start.min(now) => {
                return Ok(false);
            }
            Some(_) => {
                node.entries.remove(&value);
                changed = true;
            }
            None => {}
        }

        let supersedes = match node.dismissals.get(&value) {
            Some(existing) if existing.is_live(now) => {
                validity.start > existing.validity.start
                    || (validity.start == existing.validity.start
                        && validity.ends_after(&existing.validity))
            }
            _ => true,
        };
        if supersedes {
            node.dismissals.insert(
                value.clone(),
                Dismissal {
                    validity,
                    dismissed_by: signer,
                    origin,
                    origin_hash: hash,
                },
            );
            changed = true;
        }

        if changed {
            tracing::debug!(bucket = %path, value = %value, "dismissed");
        }
        Ok(changed)
    }

    fn fire_hooks(&mut self, event: &ProposalEvent) {
        for hook in &mut self.hooks {
            let wanted = match &hook.prefix {
                Some(prefix) => event.bucket.segments().starts_with(prefix.segments()),
                None => true,
            };
            if wanted {
                (hook.callback)(event);
            }
        }
    }

    /// Live values of one bucket (not its children)
    pub fn query(&self, path: &BucketPath) -> Vec<String> {
        let now = self.now();
        self.bucket(path)
            .map(|b| b.live_entries(now).map(|e| e.value.clone()).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, path: &BucketPath, value: &str) -> bool {
        let now = self.now();
        self.bucket(path)
            .and_then(|b| b.entry(value))
            .is_some_and(|e| e.is_live(now))
    }

    /// Names of the child buckets of `path`
    pub fn child_names(&self, path: &BucketPath) -> Vec<String> {
        self.bucket(path)
            .map(|b| b.children().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// Drop an entry without leaving a dismissal behind
    pub fn remove(&mut self, path: &BucketPath, value: &str) -> bool {
        match self.root.descend(path.segments()) {
            Some(node) if node.entries.contains_key(value) => {
                self.root.descend_mut(path.segments()).entries.remove(value);
                true
            }
            _ => false,
        }
    }

    /// Human-readable tree dump of live values
    pub fn summary(&self) -> String {
        let mut out = String::new();
        self.root.summary_lines(0, self.now(), &mut out);
        out
    }

    /// Nested mapping of live values
    pub fn summary_dict(&self) -> SummaryNode {
        self.root.summary_node(self.now())
    }

    /// The applied proposals behind every live value whose bucket path
    /// matches one of the glob patterns. Private buckets are never included.
    pub fn matching(&self, patterns: &[String]) -> Vec<Message> {
        let now = self.now();
        let mut out = Vec::new();
        for (path, node) in self.root.walk(BucketPath::default()) {
            if path.segments().is_empty() || is_private(&path) {
                continue;
            }
            if !patterns.iter().any(|p| path.matches_pattern(p)) {
                continue;
            }
            for entry in node.live_entries(now) {
                out.push(entry.origin.clone());
            }
        }
        out
    }

    /// Every live fact under `path` as it was applied, each preceded by its
    /// signature when one is known.
    pub fn facts(&self, path: &BucketPath, include_private: bool) -> Vec<Message> {
        let now = self.now();
        let Some(start) = self.bucket(path) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (sub, node) in start.walk(BucketPath::default()) {
            let full = BucketPath::new(path.segments().iter().chain(sub.segments()).cloned());
            if !include_private && is_private(&full) {
                continue;
            }
            let entries = node
                .live_entries(now)
                .map(|e| (&e.origin, &e.origin_hash, e.proposed_by));
            let dismissals = node
                .live_dismissals(now)
                .map(|d| (&d.origin, &d.origin_hash, d.dismissed_by));
            for (origin, hash, signer) in entries.chain(dismissals) {
                if let Some(signature) = self.signatures.signature_for(hash, signer) {
                    out.push(signature);
                }
                out.push(origin.clone());
            }
        }
        out
    }

    /// Every live fact in the whole store, private included
    pub fn all_facts(&self) -> Vec<Message> {
        self.root
            .children()
            .flat_map(|(name, _)| self.facts(&BucketPath::new([name.clone()]), true))
            .collect()
    }

    /// Signature message for a fact, if one has been indexed
    pub fn signature_of(&self, fact: &Message) -> HiveResult<Option<Message>> {
        let hash = message_hash(fact)?;
        Ok(self.signatures.signature_for(&hash, None))
    }

    /// Re-emit every signed live fact under `path` to each out channel:
    /// the signature envelope immediately followed by the fact envelope.
    /// Unsigned facts are not forwarded.
    pub fn rebroadcast(
        &self,
        path: &BucketPath,
        out_channels: &[Address],
        from: &Address,
    ) -> Vec<Envelope> {
        let facts = self.facts(path, false);
        let mut envelopes = Vec::new();
        let mut pending_signature: Option<&Message> = None;
        for message in &facts {
            if matches!(message, Message::Signature { .. }) {
                pending_signature = Some(message);
                continue;
            }
            let Some(signature) = pending_signature.take() else {
                continue;
            };
            for channel in out_channels {
                envelopes.push(Envelope::new(from.clone(), channel.clone(), signature.clone()));
                envelopes.push(Envelope::new(from.clone(), channel.clone(), message.clone()));
            }
        }
        envelopes
    }

    /// Drop expired facts and stale, unreferenced signatures
    pub fn cleanup(&mut self) -> CleanupResult {
        let now = self.now();
        let facts = self.root.cleanup(now);

        let mut referenced = HashSet::new();
        for (_, node) in self.root.walk(BucketPath::default()) {
            referenced.extend(node.entries.values().map(|e| e.origin_hash.clone()));
            referenced.extend(node.dismissals.values().map(|d| d.origin_hash.clone()));
        }
        let signatures = self
            .signatures
            .prune(&referenced, now.saturating_sub(SIGNATURE_GRACE));

        CleanupResult { facts, signatures }
    }
}

fn is_private(path: &BucketPath) -> bool {
    path.first() == Some(PRIVATE_BUCKET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;

    use hive_crypto::{sign_message, Identity};
    use hive_time::ManualClock;

    fn store_at(now: i64) -> (BucketStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp(now)));
        (BucketStore::new(clock.clone()), clock)
    }

    fn path(s: &str) -> BucketPath {
        BucketPath::parse(s).unwrap()
    }

    fn window(start: i64, end: i64) -> Validity {
        Validity::new(Timestamp(start), Some(Timestamp(end)))
    }

    #[test]
    fn test_propose_and_query() {
        let (mut store, _) = store_at(1_000);
        assert!(store.propose(&path("files"), "QmA", window(0, 2_000), None).unwrap());
        assert_eq!(store.query(&path("files")), vec!["QmA"]);
        assert!(store.contains(&path("files"), "QmA"));
        assert!(store.query(&path("nothing/here")).is_empty());
    }

    #[test]
    fn test_expired_entries_are_not_returned() {
        let (mut store, clock) = store_at(1_000);
        store.propose(&path("files"), "QmA", window(0, 1_500), None).unwrap();
        clock.set(Timestamp(1_501));
        assert!(store.query(&path("files")).is_empty());
        assert!(!store.contains(&path("files"), "QmA"));
    }

    #[test]
    fn test_future_entries_are_not_live_yet() {
        let (mut store, clock) = store_at(1_000);
        store.propose(&path("files"), "QmA", window(2_000, 3_000), None).unwrap();
        assert!(store.query(&path("files")).is_empty());
        clock.set(Timestamp(2_000));
        assert_eq!(store.query(&path("files")), vec!["QmA"]);
    }

    #[test]
    fn test_repropose_extends_window() {
        let (mut store, clock) = store_at(1_000);
        store.propose(&path("peer"), "p1", window(0, 1_500), None).unwrap();
        assert!(!store.propose(&path("peer"), "p1", window(0, 1_500), None).unwrap());
        assert!(store.propose(&path("peer"), "p1", window(900, 5_000), None).unwrap());
        clock.set(Timestamp(4_000));
        assert_eq!(store.query(&path("peer")), vec!["p1"]);
    }

    #[test]
    fn test_dismiss_wins_over_replayed_proposal() {
        let (mut store, _) = store_at(1_000);
        let p = path("files");
        store.propose(&p, "QmA", window(500, 5_000), None).unwrap();
        assert!(store
            .dismiss(&p, "QmA", Validity::unbounded(Timestamp(500)))
            .unwrap());
        assert!(store.query(&p).is_empty());

        // Stale proposal replayed by a lagging peer
        assert!(!store.propose(&p, "QmA", window(500, 5_000), None).unwrap());
        assert!(store.query(&p).is_empty());
    }

    #[test]
    fn test_dismiss_expires_then_proposal_applies() {
        let (mut store, clock) = store_at(1_000);
        let p = path("files");
        store.propose(&p, "QmA", window(900, 10_000), None).unwrap();
        store.dismiss(&p, "QmA", window(1_000, 2_000)).unwrap();
        assert!(!store.propose(&p, "QmA", window(900, 10_000), None).unwrap());

        clock.set(Timestamp(2_001));
        assert!(store.propose(&p, "QmA", window(900, 10_000), None).unwrap());
        assert_eq!(store.query(&p), vec!["QmA"]);
    }

    #[test]
    fn test_dismiss_now_beats_future_dated_proposal() {
        let (mut store, _) = store_at(1_000);
        let p = path("files");
        store.propose(&p, "QmA", Validity::unbounded(Timestamp(0)), None).unwrap();
        // A peer whose clock runs ahead repeats the share
        store.propose(&p, "QmA", Validity::unbounded(Timestamp(5_000)), None).unwrap();

        assert!(store.dismiss(&p, "QmA", Validity::unbounded(Timestamp(1_000))).unwrap());
        assert!(!store.contains(&p, "QmA"));
        assert!(!store.propose(&p, "QmA", Validity::unbounded(Timestamp(5_000)), None).unwrap());
    }

    #[test]
    fn test_dismiss_evicts_entry_shared_ahead_of_clock() {
        let (mut store, clock) = store_at(1_000);
        let p = path("files");
        store.propose(&p, "QmA", Validity::unbounded(Timestamp(4_000)), None).unwrap();
        assert!(store.dismiss(&p, "QmA", window(1_000, 61_000)).unwrap());

        clock.set(Timestamp(10_000));
        assert!(!store.contains(&p, "QmA"));
        assert!(store.query(&p).is_empty());
    }

    #[test]
    fn test_newer_proposal_beats_older_dismissal() {
        let (mut store, clock) = store_at(1_000);
        let p = path("files");
        store.dismiss(&p, "QmA", window(1_000, 9_000)).unwrap();
        clock.set(Timestamp(3_000));
        assert!(store.propose(&p, "QmA", window(3_000, 9_000), None).unwrap());
        assert!(store.contains(&p, "QmA"));

        // The old dismissal replayed again does not remove the newer fact
        assert!(!store.dismiss(&p, "QmA", window(1_000, 9_000)).unwrap());
        assert!(store.contains(&p, "QmA"));
    }

    #[test]
    fn test_process_rejects_control_messages_and_bad_windows() {
        let (mut store, _) = store_at(1_000);
        assert!(matches!(
            store.process(&Message::Ping),
            Err(HiveError::ProcessFailure(_))
        ));
        let backwards = Message::propose(path("files"), "QmA", window(10, 5));
        assert!(matches!(
            store.process(&backwards),
            Err(HiveError::ProcessFailure(_))
        ));
        let empty_path = Message::propose(BucketPath::new(Vec::<String>::new()), "x", window(0, 5_000));
        assert!(store.process(&empty_path).is_err());
    }

    #[test]
    fn test_unknown_buckets_created_on_demand() {
        let (mut store, _) = store_at(1_000);
        let msg = Message::propose(path("peer/abc/info/hostname"), "box", window(0, 5_000));
        assert!(store.process(&msg).unwrap());
        assert_eq!(store.query(&path("peer/abc/info/hostname")), vec!["box"]);
        assert_eq!(store.child_names(&path("peer")), vec!["abc"]);
    }

    #[test]
    fn test_signed_process_attributes_signer() {
        let (mut store, _) = store_at(1_000);
        let identity = Identity::generate();
        let fact = Message::propose(path("verified"), "QmA", Validity::unbounded(Timestamp(1_000)));
        store.process(&sign_message(&identity, &fact).unwrap()).unwrap();
        store.process(&fact).unwrap();

        let entry = store.bucket(&path("verified")).unwrap().entry("QmA").unwrap();
        assert_eq!(entry.proposed_by, Some(identity.peer_id()));
    }

    #[test]
    fn test_hooks_fire_on_applied_proposals_only() {
        let (mut store, _) = store_at(1_000);
        let (tx, rx) = mpsc::channel();
        let tx_all = tx.clone();
        store.add_proposal_hook(
            path("files"),
            Box::new(move |e: &ProposalEvent| {
                let _ = tx.send(format!("files:{}", e.data));
            }),
        );
        store.add_proposal_hook_all(Box::new(move |e: &ProposalEvent| {
            let _ = tx_all.send(format!("all:{}:{}", e.bucket, e.data));
        }));

        store.propose(&path("files"), "QmA", window(0, 5_000), None).unwrap();
        store.propose(&path("files"), "QmA", window(0, 5_000), None).unwrap();
        store.propose(&path("peer"), "p1", window(0, 5_000), None).unwrap();
        store.dismiss(&path("peer"), "p1", window(1_000, 5_000)).unwrap();

        let seen: Vec<String> = rx.try_iter().collect();
        assert_eq!(seen, vec!["files:QmA", "all:files:QmA", "all:peer:p1"]);
    }

    #[test]
    fn test_matching_excludes_private() {
        let (mut store, _) = store_at(1_000);
        store.propose(&path("files"), "QmA", window(0, 5_000), None).unwrap();
        store.propose(&path("private/notes"), "secret", window(0, 5_000), None).unwrap();
        store.propose(&path("peer/abc/addresses"), "udp://x", window(0, 5_000), None).unwrap();

        let all = store.matching(&["**".to_string()]);
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|m| m.fact().unwrap().1 != "secret"));

        let addrs = store.matching(&["peer/*/addresses".to_string()]);
        assert_eq!(addrs.len(), 1);
    }

    #[test]
    fn test_rebroadcast_forwards_signed_facts_only() {
        let (mut store, _) = store_at(1_000);
        let identity = Identity::generate();
        let signed = Message::propose(path("verified"), "QmA", Validity::unbounded(Timestamp(1_000)));
        store.process(&sign_message(&identity, &signed).unwrap()).unwrap();
        store.process(&signed).unwrap();
        store.propose(&path("files"), "QmUnsigned", window(0, 5_000), None).unwrap();

        let channels = vec![
            Address::parse("/udp/*/swarm/*/brain").unwrap(),
            Address::parse("/pubsub/*/swarm/*/brain").unwrap(),
        ];
        let from = Address::parse("/brain").unwrap();
        let out = store.rebroadcast(&BucketPath::default(), &channels, &from);

        assert_eq!(out.len(), 4);
        assert!(matches!(out[0].contents, Message::Signature { .. }));
        assert_eq!(out[1].contents, signed);
        assert_eq!(out[1].to, channels[0]);
        assert_eq!(out[3].to, channels[1]);
    }

    #[test]
    fn test_summary_views() {
        let (mut store, _) = store_at(1_000);
        store.init_bucket(&path("safe")).unwrap();
        store.propose(&path("files"), "QmA", window(0, 5_000), None).unwrap();
        store.propose(&path("peer/abc/addresses"), "udp://x", window(0, 5_000), None).unwrap();

        let text = store.summary();
        assert!(text.contains("files/\n  QmA"));
        assert!(text.contains("safe/"));

        let dict = store.summary_dict();
        assert_eq!(dict.child("files").unwrap().values, vec!["QmA"]);
        assert_eq!(
            dict.child("peer").unwrap().child("abc").unwrap().child("addresses").unwrap().values,
            vec!["udp://x"]
        );
        let json = serde_json::to_value(&dict).unwrap();
        assert_eq!(json["children"]["files"]["values"][0], "QmA");
    }

    #[test]
    fn test_cleanup_drops_expired() {
        let (mut store, clock) = store_at(1_000);
        store.propose(&path("files"), "QmA", window(0, 1_500), None).unwrap();
        store.propose(&path("files"), "QmB", window(0, 9_000), None).unwrap();
        store.dismiss(&path("files"), "QmC", window(1_000, 1_200)).unwrap();
        clock.set(Timestamp(2_000));

        let result = store.cleanup();
        assert_eq!(result.facts, 2);
        assert!(store.bucket(&path("files")).unwrap().entry("QmA").is_none());
        assert_eq!(store.query(&path("files")), vec!["QmB"]);
    }

    #[test]
    fn test_remove_leaves_no_dismissal() {
        let (mut store, _) = store_at(1_000);
        store.propose(&path("files"), "QmA", window(0, 5_000), None).unwrap();
        assert!(store.remove(&path("files"), "QmA"));
        assert!(!store.remove(&path("files"), "QmA"));
        assert!(store.propose(&path("files"), "QmA", window(0, 5_000), None).unwrap());
    }
}
