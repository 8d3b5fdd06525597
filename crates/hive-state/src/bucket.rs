//! Bucket tree - named collections of expiring facts

use std::collections::BTreeMap;

use serde::Serialize;

use hive_core::{BucketPath, ContentHash, Message, PeerId, Timestamp, Validity};

/// One live-or-expired fact in a bucket
#[derive(Clone, Debug)]
pub struct BucketEntry {
    pub value: String,
    /// Merged window of every applied proposal
    pub validity: Validity,
    pub proposed_by: Option<PeerId>,
    /// Largest logical start, `min(start, now)`, of any applied proposal
    pub latest: Timestamp,
    /// The last applied Propose, re-emitted verbatim on rebroadcast
    pub origin: Message,
    pub origin_hash: ContentHash,
}

impl BucketEntry {
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.validity.contains(now)
    }
}

/// A retraction, kept so that replayed stale proposals stay dead
#[derive(Clone, Debug)]
pub struct Dismissal {
    pub validity: Validity,
    pub dismissed_by: Option<PeerId>,
    pub origin: Message,
    pub origin_hash: ContentHash,
}

impl Dismissal {
    pub fn is_live(&self, now: Timestamp) -> bool {
        !self.validity.is_expired(now)
    }
}

/// Node in the bucket tree
#[derive(Debug, Default)]
pub struct Bucket {
    pub(crate) entries: BTreeMap<String, BucketEntry>,
    pub(crate) dismissals: BTreeMap<String, Dismissal>,
    pub(crate) children: BTreeMap<String, Bucket>,
}

impl Bucket {
    pub fn new() -> Self {
        Bucket::default()
    }

    pub fn child(&self, name: &str) -> Option<&Bucket> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &Bucket)> {
        self.children.iter()
    }

    pub fn entry(&self, value: &str) -> Option<&BucketEntry> {
        self.entries.get(value)
    }

    pub fn dismissal(&self, value: &str) -> Option<&Dismissal> {
        self.dismissals.get(value)
    }

    /// Live entries, ordered by value
    pub fn live_entries(&self, now: Timestamp) -> impl Iterator<Item = &BucketEntry> {
        self.entries.values().filter(move |e| e.is_live(now))
    }

    pub fn live_dismissals(&self, now: Timestamp) -> impl Iterator<Item = &Dismissal> {
        self.dismissals.values().filter(move |d| d.is_live(now))
    }

    /// Find a descendant
    pub fn descend(&self, path: &[String]) -> Option<&Bucket> {
        path.iter().try_fold(self, |node, name| node.children.get(name))
    }

    /// Find or create a descendant
    pub fn descend_mut(&mut self, path: &[String]) -> &mut Bucket {
        path.iter().fold(self, |node, name| {
            node.children.entry(name.clone()).or_default()
        })
    }

    /// Every node in this subtree with its path, depth first, self included
    pub fn walk(&self, path: BucketPath) -> Vec<(BucketPath, &Bucket)> {
        let mut out = Vec::new();
        self.walk_into(path, &mut out);
        out
    }

    fn walk_into<'a>(&'a self, path: BucketPath, out: &mut Vec<(BucketPath, &'a Bucket)>) {
        for (name, child) in &self.children {
            child.walk_into(path.child(name.clone()), out);
        }
        out.push((path, self));
    }

    /// Drop expired entries and dismissals in this subtree
    pub(crate) fn cleanup(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len() + self.dismissals.len();
        self.entries.retain(|_, e| !e.validity.is_expired(now));
        self.dismissals.retain(|_, d| d.is_live(now));
        let mut removed = before - self.entries.len() - self.dismissals.len();
        for child in self.children.values_mut() {
            removed += child.cleanup(now);
        }
        removed
    }

    pub(crate) fn summary_node(&self, now: Timestamp) -> SummaryNode {
        SummaryNode {
            values: self.live_entries(now).map(|e| e.value.clone()).collect(),
            children: self
                .children
                .iter()
                .map(|(name, child)| (name.clone(), child.summary_node(now)))
                .collect(),
        }
    }

    pub(crate) fn summary_lines(&self, depth: usize, now: Timestamp, out: &mut String) {
        let indent = "  ".repeat(depth);
        for entry in self.live_entries(now) {
            let by = entry
                .proposed_by
                .map(|p| p.short())
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!("{indent}{}  {}  by {by}\n", entry.value, entry.validity));
        }
        for (name, child) in &self.children {
            out.push_str(&format!("{indent}{name}/\n"));
            child.summary_lines(depth + 1, now, out);
        }
    }
}

/// Nested mapping of live values, for machine-readable summaries
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SummaryNode {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, SummaryNode>,
}

impl SummaryNode {
    pub fn child(&self, name: &str) -> Option<&SummaryNode> {
        self.children.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descend_creates_nodes() {
        let mut root = Bucket::new();
        let path = BucketPath::parse("peer/abc/addresses").unwrap();
        root.descend_mut(path.segments());
        assert!(root.descend(path.segments()).is_some());
        assert!(root.child("peer").unwrap().child("abc").is_some());
        assert!(root.descend(&["nope".to_string()]).is_none());
    }

    #[test]
    fn test_walk_visits_every_node() {
        let mut root = Bucket::new();
        root.descend_mut(BucketPath::parse("a/b").unwrap().segments());
        root.descend_mut(BucketPath::parse("c").unwrap().segments());
        let paths: Vec<String> = root
            .walk(BucketPath::default())
            .into_iter()
            .map(|(p, _)| p.to_string())
            .collect();
        assert_eq!(paths, vec!["a/b", "a", "c", ""]);
    }
}
