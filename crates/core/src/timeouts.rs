//! Crate-wide timeout defaults and deadline bookkeeping.

use std::time::Duration;

use tokio::time::Instant;

/// Default deadline for blocking operations (locator resolution, load
/// waits, event waits). Matches the conventional 30 s default of browser
/// automation tooling.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between condition polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Retry policy attached to a locator query: how long to keep polling and
/// how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total deadline for the operation.
    pub timeout: Duration,
    /// Pause between polls.
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Returns the policy with a different total deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the policy with a different poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Running deadline for one blocking operation.
///
/// Poll loops never retry past the deadline: [`next_pause`] returns the
/// pause to take before the next poll, or `None` once the budget is spent.
///
/// [`next_pause`]: Deadline::next_pause
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
}

impl Deadline {
    /// Starts a deadline now.
    pub fn start(timeout: Duration) -> Self {
        Self {
            start: Instant::now(),
            timeout,
        }
    }

    /// Time since the deadline started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Remaining budget, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.start.elapsed())
    }

    /// Returns true once the budget is spent.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Pause to take before the next poll: the poll interval, clamped to
    /// the remaining budget. `None` means the deadline has expired and the
    /// loop must fail now.
    pub fn next_pause(&self, interval: Duration) -> Option<Duration> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            None
        } else {
            Some(interval.min(remaining))
        }
    }
}
