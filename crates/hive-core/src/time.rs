//! Time primitives
//!
//! Facts are replicated between machines, so validity windows use wall-clock
//! time: milliseconds since the Unix epoch. An open end means "+inf".

use std::fmt;
use std::ops::Sub;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock timestamp, milliseconds since the Unix epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    /// Current system time
    pub fn now() -> Self {
        Timestamp::from_system(SystemTime::now())
    }

    pub fn from_system(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Timestamp(d.as_millis().min(i64::MAX as u128) as i64),
            Err(e) => Timestamp(-(e.duration().as_millis().min(i64::MAX as u128) as i64)),
        }
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    #[inline]
    pub fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1000))
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn saturating_add(self, d: Duration) -> Self {
        Timestamp(self.0.saturating_add(d.as_millis().min(i64::MAX as u128) as i64))
    }

    #[inline]
    pub fn saturating_sub(self, d: Duration) -> Self {
        Timestamp(self.0.saturating_sub(d.as_millis().min(i64::MAX as u128) as i64))
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    /// Elapsed time between two timestamps, zero if `rhs` is later
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0).max(0) as u64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T({}ms)", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0.div_euclid(1000), self.0.rem_euclid(1000))
    }
}

/// Validity window `[start, end]` of a fact. `end == None` is unbounded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Validity {
    pub start: Timestamp,
    pub end: Option<Timestamp>,
}

impl Validity {
    pub fn new(start: Timestamp, end: Option<Timestamp>) -> Self {
        Validity { start, end }
    }

    /// `[start, start + ttl]`
    pub fn starting(start: Timestamp, ttl: Duration) -> Self {
        Validity {
            start,
            end: Some(start.saturating_add(ttl)),
        }
    }

    /// `[start, +inf)`
    pub fn unbounded(start: Timestamp) -> Self {
        Validity { start, end: None }
    }

    /// Live iff `start <= now <= end`
    pub fn contains(&self, now: Timestamp) -> bool {
        self.start <= now && self.end.map_or(true, |end| now <= end)
    }

    /// Strictly past the end of the window
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.end.is_some_and(|end| end < now)
    }

    /// `end >= start`
    pub fn is_well_formed(&self) -> bool {
        self.end.map_or(true, |end| end >= self.start)
    }

    /// True if this window reaches further than `other`
    pub fn ends_after(&self, other: &Validity) -> bool {
        match (self.end, other.end) {
            (None, Some(_)) => true,
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    /// Smallest window covering both
    pub fn merge(&self, other: &Validity) -> Validity {
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
        Validity {
            start: self.start.min(other.start),
            end,
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {}]", self.start, end),
            None => write!(f, "[{}, inf)", self.start),
        }
    }
}
