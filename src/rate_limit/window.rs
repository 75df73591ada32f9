//! Sliding-window admission algorithm.
//!
//! The decision is written against [`TimestampLog`] so the same code runs over
//! a process-local queue and over a table shared between processes.

use std::collections::VecDeque;
use std::time::Duration;

use super::backend::{Admission, RateLimitResult};

/// Ordered log of admission instants, in microseconds since the Unix epoch.
///
/// Callers must hold the backend's lock for the whole decision.
pub trait TimestampLog {
    /// Drop every entry at or before `cutoff_us`.
    fn prune_through(&mut self, cutoff_us: i64) -> RateLimitResult<()>;
    /// Number of entries currently held.
    fn count(&self) -> RateLimitResult<usize>;
    /// Earliest entry, if any.
    fn oldest(&self) -> RateLimitResult<Option<i64>>;
    /// Append an entry.
    fn record(&mut self, at_us: i64) -> RateLimitResult<()>;
}

/// At most `limit` admissions in any trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    limit: u32,
    window: Duration,
}

impl SlidingWindow {
    /// Create a window. Both values must be non-zero; zero values are clamped
    /// to the smallest meaningful ones.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window: window.max(Duration::from_micros(1)),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn window_us(&self) -> i64 {
        i64::try_from(self.window.as_micros()).unwrap_or(i64::MAX)
    }

    /// Everything at or before this instant has left the window.
    pub fn cutoff(&self, now_us: i64) -> i64 {
        now_us.saturating_sub(self.window_us())
    }

    /// Prune, then either record `now_us` or report how long until a slot frees.
    pub fn admit<L: TimestampLog + ?Sized>(
        &self,
        log: &mut L,
        now_us: i64,
    ) -> RateLimitResult<Admission> {
        log.prune_through(self.cutoff(now_us))?;

        if log.count()? >= self.limit as usize {
            if let Some(oldest) = log.oldest()? {
                let wait_us = oldest.saturating_add(self.window_us()) - now_us;
                if wait_us > 0 {
                    return Ok(Admission::Wait(Duration::from_micros(wait_us as u64)));
                }
            }
        }

        log.record(now_us)?;
        Ok(Admission::Granted { at_us: now_us })
    }
}

impl TimestampLog for VecDeque<i64> {
    fn prune_through(&mut self, cutoff_us: i64) -> RateLimitResult<()> {
        while self.front().is_some_and(|&ts| ts <= cutoff_us) {
            self.pop_front();
        }
        Ok(())
    }

    fn count(&self) -> RateLimitResult<usize> {
        Ok(self.len())
    }

    fn oldest(&self) -> RateLimitResult<Option<i64>> {
        Ok(self.front().copied())
    }

    fn record(&mut self, at_us: i64) -> RateLimitResult<()> {
        self.push_back(at_us);
        Ok(())
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Wall-clock time is used so timestamps written by different processes are
/// comparable.
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
