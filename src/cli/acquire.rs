//! `acquire` command: take admissions and print when each was granted.
//!
//! One timestamp (µs since the Unix epoch) per line on stdout, so several
//! processes sharing a state file can be checked against the window.

use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;
use crate::rate_limit::RateLimiter;

pub async fn cmd_acquire(
    config: &Config,
    count: usize,
    limit: Option<u32>,
    period: Option<f64>,
    state: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut settings = config.rate_limit.clone();
    if let Some(limit) = limit {
        settings.limit = limit;
    }
    if let Some(period) = period {
        settings.time_period = period;
    }
    if let Some(state) = state {
        settings.multiprocessing_mode = true;
        settings.state_path = Some(state);
    }
    if settings.limit == 0 || settings.period().is_zero() {
        anyhow::bail!("limit and period must be greater than 0");
    }

    let limiter = RateLimiter::from_settings(&settings)?;

    let stdout = std::io::stdout();
    for _ in 0..count {
        let permit = limiter.acquire().await;
        let mut out = stdout.lock();
        writeln!(out, "{}", permit.admitted_at_us())?;
        out.flush()?;
    }
    Ok(())
}
