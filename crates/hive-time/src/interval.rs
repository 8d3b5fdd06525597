//! Interval scheduler
//!
//! Each periodic task owns one `DoAtInterval`. The control loop asks every
//! scheduler `its_time()` once per iteration; a due scheduler re-arms itself
//! one period after the moment it was asked, not after its old deadline.

use std::time::{Duration, Instant};

/// Independent "next due" deadline for one periodic task
#[derive(Clone, Debug)]
pub struct DoAtInterval {
    period: Duration,
    next_due: Instant,
}

impl DoAtInterval {
    /// Due immediately, then every `period`
    pub fn new(period: Duration) -> Self {
        DoAtInterval {
            period,
            next_due: Instant::now(),
        }
    }

    /// First due one `period` from now
    pub fn delayed(period: Duration) -> Self {
        DoAtInterval {
            period,
            next_due: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// True (and re-armed) if the deadline has passed
    pub fn its_time(&mut self) -> bool {
        self.its_time_at(Instant::now())
    }

    pub fn its_time_at(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.period;
        true
    }

    /// Make the task due on the next check
    pub fn trigger(&mut self) {
        self.next_due = Instant::now();
    }

    /// Time left until due, zero if already due
    pub fn remaining(&self) -> Duration {
        self.next_due.saturating_duration_since(Instant::now())
    }
}
