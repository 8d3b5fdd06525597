//! Routing addresses
//!
//! An address is a `/`-delimited path of segments, e.g. `/swarm/<peer>/brain`.
//! Destinations may contain the wildcard segment `*`, which matches any
//! single segment in the same position of a registered address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{HiveError, HiveResult, PeerId};

/// The single-segment wildcard
pub const WILDCARD: &str = "*";

/// Routing address (`maddr`)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    segments: Vec<String>,
}

impl Address {
    /// The empty address (no segments)
    pub fn root() -> Self {
        Address::default()
    }

    /// Parse an address. The empty string is the root address; anything
    /// else must start with `/` and contain no empty segments.
    pub fn parse(s: &str) -> HiveResult<Self> {
        if s.is_empty() {
            return Ok(Address::root());
        }
        let Some(body) = s.strip_prefix('/') else {
            return Err(HiveError::InvalidAddress(format!("{s}: missing leading '/'")));
        };
        let segments: Vec<String> = body.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(HiveError::InvalidAddress(format!("{s}: empty segment")));
        }
        Ok(Address { segments })
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Address {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// `/swarm/<peer>`, the prefix of every local mailbox of a node
    pub fn swarm(peer: &PeerId) -> Self {
        Address::from_segments(["swarm".to_string(), peer.to_hex()])
    }

    /// `/swarm/*/brain`, the brain of any node
    pub fn any_brain() -> Self {
        Address::from_segments(["swarm", WILDCARD, "brain"])
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append one segment
    pub fn child(&self, segment: impl Into<String>) -> Address {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Address { segments }
    }

    /// Concatenate two addresses
    pub fn join(&self, rest: &Address) -> Address {
        let mut segments = self.segments.clone();
        segments.extend(rest.segments.iter().cloned());
        Address { segments }
    }

    /// Exact (wildcard-free) segment prefix test
    pub fn starts_with(&self, prefix: &Address) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments.iter().zip(&prefix.segments).all(|(a, b)| a == b)
    }

    /// Drop the first `n` segments
    pub fn strip(&self, n: usize) -> Address {
        Address {
            segments: self.segments.iter().skip(n).cloned().collect(),
        }
    }

    /// Match this destination against a registered address.
    ///
    /// Returns the unmatched trailing part of the destination when every
    /// segment of `registered` matches. A `*` on either side matches any
    /// segment of the other.
    pub fn match_prefix(&self, registered: &Address) -> Option<Address> {
        if registered.segments.len() > self.segments.len() {
            return None;
        }
        let matched = self
            .segments
            .iter()
            .zip(&registered.segments)
            .all(|(dest, reg)| dest == WILDCARD || reg == WILDCARD || dest == reg);
        matched.then(|| self.strip(registered.segments.len()))
    }
}

/// String-level convenience over [`Address::match_prefix`]:
/// `(true, Some(rest))` on a match, `(false, None)` otherwise.
pub fn prefix_match(destination: &str, registered: &str) -> (bool, Option<String>) {
    let (Ok(dest), Ok(reg)) = (Address::parse(destination), Address::parse(registered)) else {
        return (false, None);
    };
    match dest.match_prefix(&reg) {
        Some(rest) => (true, Some(rest.to_string())),
        None => (false, None),
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = HiveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Address::parse(&s)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}
