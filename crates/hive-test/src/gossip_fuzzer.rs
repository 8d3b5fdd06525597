//! Gossip Fuzzer - delivery-order independence of the bucket store
//!
//! Generates a pool of proposals and dismissals, then feeds all of them to
//! several stores, each in its own shuffled order and with random
//! duplicates, the way rebroadcasts arrive from many peers. Every store must
//! end with the same live values, and those must match the reference rule:
//! a value is live when its newest fact is a proposal, a dismissal winning
//! a tie.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use hive_core::{BucketPath, HiveResult, Message, Timestamp, Validity};
use hive_state::{swarm_store, BucketStore};
use hive_time::{ManualClock, SharedClock};

const BUCKETS: [&str; 3] = ["files", "share", "peer/fuzz/addresses"];

/// Fuzzer configuration
#[derive(Clone, Debug)]
pub struct GossipFuzzConfig {
    pub node_count: usize,
    pub value_count: usize,
    pub fact_count: usize,
    /// Probability a delivered fact is delivered again later
    pub duplicate_prob: f64,
    /// Probability a fact is a dismissal
    pub dismiss_prob: f64,
    pub seed: u64,
}

impl Default for GossipFuzzConfig {
    fn default() -> Self {
        GossipFuzzConfig {
            node_count: 4,
            value_count: 6,
            fact_count: 200,
            duplicate_prob: 0.2,
            dismiss_prob: 0.35,
            seed: 42,
        }
    }
}

impl GossipFuzzConfig {
    /// Light fuzzing for quick tests
    pub fn light() -> Self {
        GossipFuzzConfig {
            node_count: 3,
            value_count: 3,
            fact_count: 40,
            ..Default::default()
        }
    }
}

/// Live values per bucket
pub type LiveView = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug)]
pub struct GossipFuzzResult {
    pub facts: usize,
    pub deliveries: usize,
    pub expected: LiveView,
    pub views: Vec<LiveView>,
}

impl GossipFuzzResult {
    pub fn is_converged(&self) -> bool {
        self.views.iter().all(|v| *v == self.expected)
    }
}

pub struct GossipFuzzer {
    config: GossipFuzzConfig,
    rng: StdRng,
}

impl GossipFuzzer {
    pub fn new(config: GossipFuzzConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        GossipFuzzer { config, rng }
    }

    fn generate(&mut self) -> Vec<Message> {
        let max_start = (self.config.fact_count as i64).max(1);
        (0..self.config.fact_count)
            .map(|_| {
                let bucket = BucketPath::new(BUCKETS[self.rng.gen_range(0..BUCKETS.len())].split('/'));
                let value = format!("v{}", self.rng.gen_range(0..self.config.value_count.max(1)));
                // Narrow start range so ties between proposals and dismissals happen
                let validity = Validity::unbounded(Timestamp(self.rng.gen_range(0..max_start / 4 + 1)));
                if self.rng.gen_bool(self.config.dismiss_prob) {
                    Message::dismiss(bucket, value, validity)
                } else {
                    Message::propose(bucket, value, validity)
                }
            })
            .collect()
    }

    fn schedule(&mut self, facts: &[Message]) -> Vec<Message> {
        let mut order: Vec<Message> = facts.to_vec();
        for fact in facts {
            if self.rng.gen_bool(self.config.duplicate_prob) {
                order.push(fact.clone());
            }
        }
        order.shuffle(&mut self.rng);
        order
    }

    /// Run the fuzzer
    pub fn run(&mut self) -> HiveResult<GossipFuzzResult> {
        let facts = self.generate();
        let clock: SharedClock = Arc::new(ManualClock::new(Timestamp(1_000_000)));
        let mut views = Vec::with_capacity(self.config.node_count);
        let mut deliveries = 0;
        for _ in 0..self.config.node_count {
            let mut store = swarm_store(clock.clone())?;
            let order = self.schedule(&facts);
            deliveries += order.len();
            for fact in &order {
                store.process(fact)?;
            }
            views.push(live_view(&store));
        }
        Ok(GossipFuzzResult {
            facts: facts.len(),
            deliveries,
            expected: expected_view(&facts),
            views,
        })
    }
}

/// Live values of every fuzzed bucket
pub fn live_view(store: &BucketStore) -> LiveView {
    BUCKETS
        .iter()
        .map(|b| {
            let values = store.query(&BucketPath::new(b.split('/'))).into_iter().collect();
            (b.to_string(), values)
        })
        .collect()
}

/// What every store should converge to
pub fn expected_view(facts: &[Message]) -> LiveView {
    // (bucket, value) -> (newest start, newest is a dismissal)
    let mut newest: BTreeMap<(String, String), (Timestamp, bool)> = BTreeMap::new();
    for fact in facts {
        let Some((bucket, value, validity)) = fact.fact() else {
            continue;
        };
        let dismissal = matches!(fact, Message::Dismiss { .. });
        let key = (bucket.to_string(), value.to_string());
        let candidate = (validity.start, dismissal);
        newest
            .entry(key)
            .and_modify(|current| {
                if candidate > *current {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    let mut view: LiveView = BUCKETS.iter().map(|b| (b.to_string(), BTreeSet::new())).collect();
    for ((bucket, value), (_, dismissed)) in newest {
        if !dismissed {
            view.entry(bucket).or_default().insert(value);
        }
    }
    view
}
