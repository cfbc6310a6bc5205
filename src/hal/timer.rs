//! Timer Abstractions
//!
//! Deadline helper on the monotonic embassy clock.

use embassy_time::{Duration, Instant};

/// Timeout helper
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout {
    deadline: Instant,
}

impl Timeout {
    /// Create a new timeout from duration
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self::starting_at(Instant::now(), duration)
    }

    /// Create a timeout running from `start`
    #[must_use]
    pub fn starting_at(start: Instant, duration: Duration) -> Self {
        Self {
            deadline: start + duration,
        }
    }

    /// Check if timeout has expired
    #[must_use]
    pub fn expired(&self) -> bool {
        self.expired_at(Instant::now())
    }

    /// Check if timeout has expired at `now`
    #[must_use]
    pub fn expired_at(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}
