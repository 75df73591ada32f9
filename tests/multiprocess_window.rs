//! Cross-process rate limiting.
//!
//! Spawns several `throttle acquire` processes against one SQLite state file
//! and checks that the merged admission log never exceeds the limit inside
//! any window.

use std::path::Path;
use std::process::{Command, Output, Stdio};

const LIMIT: usize = 3;
const PERIOD_SECS: f64 = 0.4;

fn spawn_acquire(state: &Path, count: usize) -> std::process::Child {
    Command::new(env!("CARGO_BIN_EXE_throttle"))
        .args([
            "acquire",
            "--count",
            &count.to_string(),
            "--limit",
            &LIMIT.to_string(),
            "--period",
            &PERIOD_SECS.to_string(),
            "--state",
        ])
        .arg(state)
        .env_remove("THROTTLE_RATE_LIMIT")
        .env_remove("THROTTLE_TIME_PERIOD")
        .env_remove("THROTTLE_STATE_PATH")
        .env_remove("THROTTLE_MULTIPROCESS")
        .env("RUST_LOG", "off")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn throttle")
}

fn parse_stamps(output: &Output) -> Vec<i64> {
    assert!(
        output.status.success(),
        "throttle acquire failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| line.trim().parse().expect("timestamp"))
        .collect()
}

#[test]
fn test_processes_share_one_window() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("limits.db");

    // Create the state file up front so the racers only contend on admissions
    let setup = spawn_acquire(&state, 0).wait_with_output().unwrap();
    assert!(parse_stamps(&setup).is_empty());

    let per_process = 4;
    let children: Vec<_> = (0..3).map(|_| spawn_acquire(&state, per_process)).collect();

    let mut stamps: Vec<i64> = children
        .into_iter()
        .map(|child| child.wait_with_output().unwrap())
        .flat_map(|output| parse_stamps(&output))
        .collect();

    assert_eq!(stamps.len(), 3 * per_process);
    stamps.sort_unstable();

    let window_us = (PERIOD_SECS * 1_000_000.0) as i64;
    for run in stamps.windows(LIMIT + 1) {
        assert!(
            run[LIMIT] - run[0] >= window_us,
            "{} admissions within {}µs: {:?}",
            LIMIT + 1,
            window_us,
            run
        );
    }

    // 12 admissions at 3 per window need at least 3 full windows
    let span = stamps[stamps.len() - 1] - stamps[0];
    assert!(span >= 3 * window_us, "span {}µs too short", span);
}

#[test]
fn test_acquire_without_state_is_single_process() {
    let output = Command::new(env!("CARGO_BIN_EXE_throttle"))
        .args(["acquire", "--count", "2", "--limit", "5", "--period", "1"])
        .env_remove("THROTTLE_MULTIPROCESS")
        .env("RUST_LOG", "off")
        .output()
        .unwrap();

    let stamps = parse_stamps(&output);
    assert_eq!(stamps.len(), 2);
    assert!(stamps[0] <= stamps[1]);
}
