//! Rate limiting infrastructure for outgoing requests.
//!
//! Sliding-window admission control with pluggable backends:
//! - In-memory (default, one process)
//! - SQLite (shared by every process opening the same file)

mod backend;
mod limiter;
mod memory;
mod sqlite;
mod window;

// Re-export main types
pub use backend::{Admission, RateLimitError, RateLimitResult, WindowBackend};
pub use limiter::{BoxedWindowBackend, Permit, RateLimiter};
pub use memory::InMemoryWindowBackend;
pub use sqlite::SqliteWindowBackend;
pub use window::{now_us, SlidingWindow, TimestampLog};
