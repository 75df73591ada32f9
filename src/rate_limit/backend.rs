//! Pluggable backend trait for the shared admission log.
//!
//! Allows swapping between in-memory (single process) and SQLite
//! (multi-process) storage without touching the admission algorithm.

use std::time::Duration;

use async_trait::async_trait;

use super::window::SlidingWindow;

/// Result type for rate limit operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors from rate limit backend operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Decision abandoned by its caller")]
    Cancelled,
}

impl From<rusqlite::Error> for RateLimitError {
    fn from(e: rusqlite::Error) -> Self {
        RateLimitError::Database(e.to_string())
    }
}

/// Outcome of one admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request was admitted and recorded at the given instant (µs since epoch).
    Granted { at_us: i64 },
    /// The window is full; the earliest slot frees up after this long.
    Wait(Duration),
}

/// Trait for admission log storage backends.
///
/// Implementations hold the lock for the duration of one decision only and
/// must be safe to call from many tasks (and, for shared backends, many
/// processes) at once.
#[async_trait]
pub trait WindowBackend: Send + Sync {
    /// Run one admission decision under the backend's lock.
    async fn try_admit(&self, window: &SlidingWindow) -> RateLimitResult<Admission>;

    /// Timestamps (µs since epoch) still inside the window, oldest first.
    async fn recent(&self, window: &SlidingWindow) -> RateLimitResult<Vec<i64>>;

    /// Short label for log lines.
    fn kind(&self) -> &'static str;
}
