//! SQLite-backed admission log for multi-process coordination.
//!
//! Every process that opens the same database file shares one log per limiter
//! name. Each decision runs inside a `BEGIN IMMEDIATE` transaction, which takes
//! SQLite's write lock up front and so serializes decisions across processes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::debug;

use super::backend::{Admission, RateLimitError, RateLimitResult, WindowBackend};
use super::window::{now_us, SlidingWindow, TimestampLog};

/// Open a database connection with proper concurrency settings.
fn open_db(db_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA busy_timeout = 30000;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
    "#,
    )?;
    Ok(conn)
}

/// Initialize the admission table in the database.
fn init_admission_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS rate_limit_admissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            limiter TEXT NOT NULL,
            admitted_at_us INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_rate_limit_admissions_limiter
            ON rate_limit_admissions (limiter, admitted_at_us);
    "#,
    )?;
    Ok(())
}

/// One limiter's rows, viewed through an open transaction.
struct SqliteLog<'a> {
    conn: &'a Connection,
    limiter: &'a str,
}

impl TimestampLog for SqliteLog<'_> {
    fn prune_through(&mut self, cutoff_us: i64) -> RateLimitResult<()> {
        self.conn.execute(
            "DELETE FROM rate_limit_admissions WHERE limiter = ?1 AND admitted_at_us <= ?2",
            params![self.limiter, cutoff_us],
        )?;
        Ok(())
    }

    fn count(&self) -> RateLimitResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM rate_limit_admissions WHERE limiter = ?1",
            params![self.limiter],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn oldest(&self) -> RateLimitResult<Option<i64>> {
        let oldest: Option<i64> = self.conn.query_row(
            "SELECT MIN(admitted_at_us) FROM rate_limit_admissions WHERE limiter = ?1",
            params![self.limiter],
            |row| row.get(0),
        )?;
        Ok(oldest)
    }

    fn record(&mut self, at_us: i64) -> RateLimitResult<()> {
        self.conn.execute(
            "INSERT INTO rate_limit_admissions (limiter, admitted_at_us) VALUES (?1, ?2)",
            params![self.limiter, at_us],
        )?;
        Ok(())
    }
}

/// Raises the shared flag when the owning future is dropped unfinished.
struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

/// SQLite admission log storage.
#[derive(Clone)]
pub struct SqliteWindowBackend {
    conn: Arc<Mutex<Connection>>,
    limiter: Arc<str>,
    path: PathBuf,
}

impl SqliteWindowBackend {
    /// Open (creating if needed) the database at `path` and use the log
    /// stored under `limiter`.
    pub fn open(path: &Path, limiter: &str) -> RateLimitResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| RateLimitError::Unavailable(format!("{}: {}", parent.display(), e)))?;
        }

        let conn = open_db(path)?;
        init_admission_table(&conn)?;
        debug!("Opened shared rate limit log {:?} at {}", limiter, path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            limiter: Arc::from(limiter),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside an immediate transaction on the blocking pool.
    ///
    /// The blocking task outlives a dropped caller, so the transaction is
    /// rolled back instead of committed once the caller is gone.
    async fn with_log<T, F>(&self, f: F) -> RateLimitResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteLog<'_>) -> RateLimitResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let limiter = Arc::clone(&self.limiter);
        let cancelled = Arc::new(AtomicBool::new(false));
        let guard = CancelOnDrop::new(Arc::clone(&cancelled));

        let outcome = tokio::task::spawn_blocking(move || -> RateLimitResult<T> {
            let mut conn = conn
                .lock()
                .map_err(|_| RateLimitError::Unavailable("connection lock poisoned".into()))?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let result = {
                let mut log = SqliteLog {
                    conn: &tx,
                    limiter: &limiter,
                };
                f(&mut log)?
            };
            if cancelled.load(Ordering::SeqCst) {
                // Dropping the transaction rolls it back
                debug!("Discarding rate limit decision for {:?}: caller is gone", &*limiter);
                return Err(RateLimitError::Cancelled);
            }
            tx.commit()?;
            Ok(result)
        })
        .await;

        guard.disarm();
        outcome.map_err(|e| RateLimitError::Unavailable(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl WindowBackend for SqliteWindowBackend {
    async fn try_admit(&self, window: &SlidingWindow) -> RateLimitResult<Admission> {
        let window = *window;
        // Clock is read under the write lock
        self.with_log(move |log| window.admit(log, now_us())).await
    }

    async fn recent(&self, window: &SlidingWindow) -> RateLimitResult<Vec<i64>> {
        let cutoff = window.cutoff(now_us());
        self.with_log(move |log| {
            log.prune_through(cutoff)?;
            let mut stmt = log.conn.prepare(
                "SELECT admitted_at_us FROM rate_limit_admissions WHERE limiter = ?1 ORDER BY admitted_at_us, id",
            )?;
            let rows = stmt.query_map(params![log.limiter], |row| row.get::<_, i64>(0))?;
            let mut timestamps = Vec::new();
            for row in rows {
                timestamps.push(row?);
            }
            Ok(timestamps)
        })
        .await
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}
