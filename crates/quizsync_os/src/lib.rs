#![forbid(unsafe_code)]

pub mod leaderboard;
pub mod ledger_client;
pub mod notice;
pub mod quiz_client;
pub mod reward_finalizer;
pub mod score_capture;
pub mod score_submitter;
pub mod session_sync;

use std::time::{SystemTime, UNIX_EPOCH};

use quizsync_kernel_contracts::WallClockMs;

/// Current local wall-clock time. A clock set before the epoch reads as 0.
pub fn wall_clock_now() -> WallClockMs {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    WallClockMs(u64::try_from(ms).unwrap_or(u64::MAX))
}
