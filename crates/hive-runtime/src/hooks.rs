//! Routing of applied proposals to workers
//!
//! The store's proposal hooks only queue events; the brain drains the queue
//! after each message and asks [`HookState`] which worker, if any, should
//! see each event.

use std::collections::HashSet;

use hive_core::{Message, PeerId};
use hive_state::{BucketStore, ProposalEvent};

/// Worker pools the brain feeds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Verifier,
    Pinner,
    Connector,
    SummaryReader,
}

impl Role {
    /// Mailbox segment under `/swarm/<peer>`
    pub fn segment(self) -> &'static str {
        match self {
            Role::Verifier => "verifier",
            Role::Pinner => "pinner",
            Role::Connector => "connector",
            Role::SummaryReader => "summary-reader",
        }
    }
}

/// Values already handed to a worker during this brain run
pub struct HookState {
    self_hex: String,
    considered: HashSet<(Role, String)>,
}

impl HookState {
    pub fn new(self_id: PeerId) -> Self {
        HookState {
            self_hex: self_id.to_hex(),
            considered: HashSet::new(),
        }
    }

    /// The worker that should handle `event`, at most once per value
    pub fn route(&mut self, event: &ProposalEvent, store: &BucketStore) -> Option<Role> {
        let role = self.classify(event, store)?;
        self.considered
            .insert((role, event.data.clone()))
            .then_some(role)
    }

    fn classify(&self, event: &ProposalEvent, store: &BucketStore) -> Option<Role> {
        let segments: Vec<&str> = event.bucket.segments().iter().map(String::as_str).collect();
        match segments.as_slice() {
            ["files"] => {
                let settled = ["verified", "safe", "discard"]
                    .iter()
                    .any(|b| store.contains(&hive_core::BucketPath::new([*b]), &event.data));
                (!settled).then_some(Role::Verifier)
            }
            ["verified"] => {
                let pinned = store.contains(&hive_core::BucketPath::new(["safe"]), &event.data);
                (!pinned).then_some(Role::Pinner)
            }
            ["peer"] => (event.data != self.self_hex).then_some(Role::Connector),
            ["peer", peer, "addresses"] => (*peer != self.self_hex).then_some(Role::Connector),
            ["peer", peer, "summary"] => (*peer != self.self_hex).then_some(Role::SummaryReader),
            _ => None,
        }
    }
}

/// What a worker receives for an event
pub fn work_item(event: &ProposalEvent) -> Message {
    Message::propose(event.bucket.clone(), event.data.clone(), event.validity)
}

#[cfg(test)]
mod tests {
    use super::*;

    use hive_core::{BucketPath, Timestamp, Validity};
    use hive_state::swarm_store;
    use hive_time::SystemClock;

    fn event(bucket: &str, data: &str) -> ProposalEvent {
        ProposalEvent {
            bucket: BucketPath::parse(bucket).unwrap(),
            data: data.to_string(),
            validity: Validity::unbounded(Timestamp(0)),
            proposed_by: None,
        }
    }

    #[test]
    fn test_routes_by_bucket() {
        let me = PeerId::from_bytes([1; 32]);
        let other = PeerId::from_bytes([2; 32]).to_hex();
        let store = swarm_store(SystemClock::shared()).unwrap();
        let mut hooks = HookState::new(me);

        assert_eq!(hooks.route(&event("files", "h1"), &store), Some(Role::Verifier));
        assert_eq!(hooks.route(&event("verified", "h1"), &store), Some(Role::Pinner));
        assert_eq!(hooks.route(&event("peer", &other), &store), Some(Role::Connector));
        assert_eq!(hooks.route(&event("peer", &me.to_hex()), &store), None);
        assert_eq!(
            hooks.route(&event(&format!("peer/{other}/addresses"), "udp://x"), &store),
            Some(Role::Connector)
        );
        assert_eq!(
            hooks.route(&event(&format!("peer/{}/summary", me.to_hex()), "s"), &store),
            None
        );
        assert_eq!(
            hooks.route(&event(&format!("peer/{other}/summary"), "s"), &store),
            Some(Role::SummaryReader)
        );
        assert_eq!(hooks.route(&event("networks", "udp/lan"), &store), None);
    }

    #[test]
    fn test_each_value_considered_once() {
        let store = swarm_store(SystemClock::shared()).unwrap();
        let mut hooks = HookState::new(PeerId::ZERO);
        assert!(hooks.route(&event("files", "h1"), &store).is_some());
        assert!(hooks.route(&event("files", "h1"), &store).is_none());
        assert!(hooks.route(&event("files", "h2"), &store).is_some());
    }

    #[test]
    fn test_settled_files_skip_verifier() {
        let mut store = swarm_store(SystemClock::shared()).unwrap();
        store
            .propose(
                &BucketPath::new(["discard"]),
                "h1",
                Validity::unbounded(Timestamp(0)),
                None,
            )
            .unwrap();
        let mut hooks = HookState::new(PeerId::ZERO);
        assert_eq!(hooks.route(&event("files", "h1"), &store), None);
    }
}
