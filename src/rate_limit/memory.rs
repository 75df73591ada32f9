//! In-memory admission log for single-process operation.
//!
//! Fast, lock-based backend shared by every task holding a clone.
//! State is not persisted across restarts. Timestamps come from the runtime's
//! monotonic clock, anchored to the wall clock once at construction.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::backend::{Admission, RateLimitResult, WindowBackend};
use super::window::{now_us, SlidingWindow, TimestampLog};

/// Microseconds since epoch that never step backwards.
#[derive(Debug, Clone, Copy)]
struct MonotonicClock {
    origin: Instant,
    origin_us: i64,
}

impl MonotonicClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_us: now_us(),
        }
    }

    fn now_us(&self) -> i64 {
        let elapsed = i64::try_from(self.origin.elapsed().as_micros()).unwrap_or(i64::MAX);
        self.origin_us.saturating_add(elapsed)
    }
}

/// In-memory admission log.
#[derive(Clone)]
pub struct InMemoryWindowBackend {
    timestamps: Arc<Mutex<VecDeque<i64>>>,
    clock: MonotonicClock,
}

impl InMemoryWindowBackend {
    pub fn new() -> Self {
        Self {
            timestamps: Arc::default(),
            clock: MonotonicClock::new(),
        }
    }
}

impl Default for InMemoryWindowBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowBackend for InMemoryWindowBackend {
    async fn try_admit(&self, window: &SlidingWindow) -> RateLimitResult<Admission> {
        let mut timestamps = self.timestamps.lock().await;
        window.admit(&mut *timestamps, self.clock.now_us())
    }

    async fn recent(&self, window: &SlidingWindow) -> RateLimitResult<Vec<i64>> {
        let mut timestamps = self.timestamps.lock().await;
        timestamps.prune_through(window.cutoff(self.clock.now_us()))?;
        Ok(timestamps.iter().copied().collect())
    }

    fn kind(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_admission_is_granted() {
        let backend = InMemoryWindowBackend::new();
        let window = SlidingWindow::new(1, Duration::from_secs(5));

        let admission = backend.try_admit(&window).await.unwrap();
        assert!(matches!(admission, Admission::Granted { .. }));
    }

    #[tokio::test]
    async fn test_full_window_reports_wait() {
        let backend = InMemoryWindowBackend::new();
        let window = SlidingWindow::new(1, Duration::from_secs(5));

        backend.try_admit(&window).await.unwrap();
        match backend.try_admit(&window).await.unwrap() {
            Admission::Wait(wait) => {
                assert!(wait > Duration::from_secs(4));
                assert!(wait <= Duration::from_secs(5));
            }
            other => panic!("expected a wait, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_measured_on_the_runtime_clock() {
        let backend = InMemoryWindowBackend::new();
        let window = SlidingWindow::new(1, Duration::from_secs(5));

        backend.try_admit(&window).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(
            backend.try_admit(&window).await.unwrap(),
            Admission::Wait(Duration::from_secs(3))
        );

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(matches!(
            backend.try_admit(&window).await.unwrap(),
            Admission::Granted { .. }
        ));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let backend = InMemoryWindowBackend::new();
        let other = backend.clone();
        let window = SlidingWindow::new(2, Duration::from_secs(5));

        backend.try_admit(&window).await.unwrap();
        other.try_admit(&window).await.unwrap();

        let recent = backend.recent(&window).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0] <= recent[1]);
    }
}
