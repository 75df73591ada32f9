//! Sliding-window rate limiter.
//!
//! Provides a blocking-until-admitted API on top of a pluggable backend.
//! Supports in-memory and SQLite (multi-process) backends.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{Admission, RateLimitResult, WindowBackend};
use super::memory::InMemoryWindowBackend;
use super::sqlite::SqliteWindowBackend;
use super::window::SlidingWindow;
use crate::config::RateLimitSettings;

/// Type alias for a boxed window backend.
pub type BoxedWindowBackend = Arc<dyn WindowBackend>;

/// Pause before re-running a decision the backend failed to make.
const BACKEND_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Proof of one admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    admitted_at_us: i64,
    waited: Duration,
}

impl Permit {
    /// Admission instant in microseconds since the Unix epoch.
    pub fn admitted_at_us(&self) -> i64 {
        self.admitted_at_us
    }

    /// Time spent waiting for capacity (including queueing behind other callers).
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

/// Rate limiter enforcing "at most `limit` admissions in any trailing window".
///
/// Clones share the same log. Callers are never rejected: `acquire` waits
/// until a slot is free.
#[derive(Clone)]
pub struct RateLimiter {
    backend: BoxedWindowBackend,
    window: SlidingWindow,
    /// Fair queue for callers of this limiter. Waiters keep their place while
    /// sleeping, but the backend lock itself is only held per decision.
    queue: Arc<Mutex<()>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given backend.
    pub fn new(backend: BoxedWindowBackend, window: SlidingWindow) -> Self {
        Self {
            backend,
            window,
            queue: Arc::new(Mutex::new(())),
        }
    }

    /// Process-local limiter.
    pub fn in_memory(limit: u32, period: Duration) -> Self {
        Self::new(
            Arc::new(InMemoryWindowBackend::new()),
            SlidingWindow::new(limit, period),
        )
    }

    /// Limiter shared by every process that opens `path` with the same `name`.
    pub fn shared(path: &Path, name: &str, limit: u32, period: Duration) -> RateLimitResult<Self> {
        let backend = SqliteWindowBackend::open(path, name)?;
        Ok(Self::new(
            Arc::new(backend),
            SlidingWindow::new(limit, period),
        ))
    }

    /// Build the limiter described by configuration.
    pub fn from_settings(settings: &RateLimitSettings) -> RateLimitResult<Self> {
        let limiter = if settings.multiprocessing_mode {
            let path = settings.state_path();
            let limiter = Self::shared(&path, &settings.name, settings.limit, settings.period())?;
            info!(
                "Multiprocessing RateLimiter initialized with {} requests per {} seconds ({})",
                settings.limit,
                settings.time_period,
                path.display()
            );
            limiter
        } else {
            let limiter = Self::in_memory(settings.limit, settings.period());
            info!(
                "Multithreading RateLimiter initialized with {} requests per {} seconds",
                settings.limit, settings.time_period
            );
            limiter
        };
        Ok(limiter)
    }

    pub fn limit(&self) -> u32 {
        self.window.limit()
    }

    pub fn window(&self) -> Duration {
        self.window.window()
    }

    /// Backend label ("in-memory" or "sqlite").
    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Wait until a request can be made without exceeding the rate limit,
    /// then record it.
    ///
    /// Never fails. Backend errors are logged and the decision is retried, so
    /// a broken backend stalls callers rather than letting them through.
    /// Wrap the call in `tokio::time::timeout` for bounded waiting.
    pub async fn acquire(&self) -> Permit {
        let started = Instant::now();
        let _turn = self.queue.lock().await;

        loop {
            match self.backend.try_admit(&self.window).await {
                Ok(Admission::Granted { at_us }) => {
                    return Permit {
                        admitted_at_us: at_us,
                        waited: started.elapsed(),
                    };
                }
                Ok(Admission::Wait(wait)) => {
                    debug!("RateLimiter triggered for {:.2} seconds", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!(
                        "Rate limit decision failed on {} backend: {}; retrying",
                        self.backend.kind(),
                        e
                    );
                    tokio::time::sleep(BACKEND_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Acquire a permit, then run `work`.
    pub async fn throttle<F>(&self, work: F) -> F::Output
    where
        F: Future,
    {
        self.acquire().await;
        work.await
    }

    /// Admission timestamps (µs since epoch) inside the current window.
    pub async fn recent_admissions(&self) -> RateLimitResult<Vec<i64>> {
        self.backend.recent(&self.window).await
    }
}
