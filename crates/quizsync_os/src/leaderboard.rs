#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use quizsync_engines::standing::merge_standing;
use quizsync_kernel_contracts::round::QuizPhase;
use quizsync_kernel_contracts::session::{RoundTiming, SessionId, SessionLifecycle};
use quizsync_kernel_contracts::standing::StandingSnapshot;
use quizsync_kernel_contracts::WallClockMs;
use tracing::{debug, info, warn};

use crate::ledger_client::{bounded, LedgerClient, LedgerError};
use crate::notice::ClientNotice;
use crate::session_sync::fetch_session;

/// One successful leaderboard read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandingFetch {
    pub snapshot: StandingSnapshot,
    pub notices: Vec<ClientNotice>,
}

/// Reads the session and every listed player's score entry.
///
/// A failed or absent entry counts as 0. Only a failed session read fails the fetch.
pub async fn fetch_standing(
    ledger: &dyn LedgerClient,
    session_id: &SessionId,
    fallback_timing: RoundTiming,
    timeout: Duration,
    now: WallClockMs,
) -> Result<StandingFetch, LedgerError> {
    let view = fetch_session(ledger, session_id, fallback_timing, timeout).await?;
    let mut notices = view.notices;
    let session = view.session;

    let mut scores = BTreeMap::new();
    for player in &session.players {
        let read = bounded(
            "read_score_entry",
            timeout,
            ledger.read_score_entry(&session.score_table_id, player),
        )
        .await;
        match read {
            Ok(score) => {
                scores.insert(player.clone(), score);
            }
            Err(LedgerError::NotFound { .. }) => {
                debug!(session_id = %session_id, player_id = %player, "no score entry yet");
            }
            Err(e) => {
                warn!(session_id = %session_id, player_id = %player, error = %e, "score entry read failed");
                notices.push(ClientNotice::from_ledger_error(&e));
            }
        }
    }

    let snapshot = merge_standing(
        &session.players,
        &scores,
        now,
        session.lifecycle == SessionLifecycle::Ended,
    );
    Ok(StandingFetch { snapshot, notices })
}

/// Keeps the latest standing while the local phase is terminal.
#[derive(Debug, Clone)]
pub struct LeaderboardAggregator {
    session_id: SessionId,
    fallback_timing: RoundTiming,
    latest: Option<StandingSnapshot>,
    active: bool,
    poll_count: u64,
}

impl LeaderboardAggregator {
    pub fn new(session_id: SessionId, fallback_timing: RoundTiming) -> Self {
        Self {
            session_id,
            fallback_timing,
            latest: None,
            active: true,
            poll_count: 0,
        }
    }

    pub fn should_poll(&self, phase: QuizPhase) -> bool {
        self.active && phase.is_terminal()
    }

    /// Folds one fetch result into the aggregator. On error the previous snapshot is kept.
    ///
    /// A snapshot polled before the one already held is dropped; its notices still surface.
    pub fn apply(&mut self, result: Result<StandingFetch, LedgerError>) -> Vec<ClientNotice> {
        self.poll_count += 1;
        match result {
            Ok(fetch) => {
                if let Some(latest) = &self.latest {
                    if fetch.snapshot.polled_at < latest.polled_at {
                        debug!(
                            session_id = %self.session_id,
                            polled_at = fetch.snapshot.polled_at.0,
                            latest_polled_at = latest.polled_at.0,
                            "older standing arrived late; ignored"
                        );
                        return fetch.notices;
                    }
                }
                if fetch.snapshot.session_finalized && self.active {
                    info!(session_id = %self.session_id, "session finalized; leaderboard polling stopped");
                    self.active = false;
                }
                self.latest = Some(fetch.snapshot);
                fetch.notices
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "leaderboard poll failed; keeping previous standing");
                vec![ClientNotice::from_ledger_error(&e)]
            }
        }
    }

    pub async fn poll(
        &mut self,
        ledger: &dyn LedgerClient,
        timeout: Duration,
        now: WallClockMs,
    ) -> Vec<ClientNotice> {
        if !self.active {
            return Vec::new();
        }
        let result = fetch_standing(ledger, &self.session_id, self.fallback_timing, timeout, now).await;
        self.apply(result)
    }

    pub fn teardown(&mut self) {
        if self.active {
            debug!(session_id = %self.session_id, "leaderboard torn down");
        }
        self.active = false;
    }

    pub fn latest(&self) -> Option<&StandingSnapshot> {
        self.latest.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn fallback_timing(&self) -> RoundTiming {
        self.fallback_timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger_client::test_support::*;
    use crate::notice::NoticeKind;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn at_leaderboard_01_missing_entries_score_zero_in_join_order() {
        let clock = TestClock::at(1_000);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa", "0xb", "0xc"]).await;
        ledger
            .write_submit_score(&sid, &pid("0xa"), 300)
            .await
            .unwrap();

        let mut agg = LeaderboardAggregator::new(sid, RoundTiming::mvp_v1());
        let notices = agg.poll(&ledger, TIMEOUT, WallClockMs(70_000)).await;
        assert!(notices.is_empty());

        let snap = agg.latest().unwrap();
        let rows: Vec<(String, u64, bool)> = snap
            .entries
            .iter()
            .map(|e| (e.player_id.as_str().to_string(), e.score, e.submitted))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("0xa".to_string(), 300, true),
                ("0xb".to_string(), 0, false),
                ("0xc".to_string(), 0, false),
            ]
        );
        assert!(!snap.session_finalized);
        assert!(agg.is_active());
    }

    #[tokio::test]
    async fn at_leaderboard_02_failed_read_keeps_previous_snapshot() {
        let clock = TestClock::at(1_000);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa"]).await;
        let mut agg = LeaderboardAggregator::new(sid, RoundTiming::mvp_v1());
        agg.poll(&ledger, TIMEOUT, WallClockMs(70_000)).await;
        let before = agg.latest().cloned();

        let notices = agg.apply(Err(LedgerError::Network("connection reset".to_string())));
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Network);
        assert_eq!(agg.latest().cloned(), before);
        assert!(agg.is_active());
        assert_eq!(agg.poll_count(), 2);
    }

    #[tokio::test]
    async fn at_leaderboard_03_polling_stops_once_finalized() {
        let clock = TestClock::at(1_000);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa", "0xb"]).await;
        ledger
            .write_submit_score(&sid, &pid("0xb"), 900)
            .await
            .unwrap();
        ledger
            .write_finalize(&sid, &pid("0xhost"), &[pid("0xb")])
            .await
            .unwrap();

        let mut agg = LeaderboardAggregator::new(sid, RoundTiming::mvp_v1());
        assert!(agg.should_poll(QuizPhase::Leaderboard));
        agg.poll(&ledger, TIMEOUT, WallClockMs(70_000)).await;
        assert!(agg.latest().unwrap().session_finalized);
        assert!(!agg.should_poll(QuizPhase::Leaderboard));

        agg.poll(&ledger, TIMEOUT, WallClockMs(72_000)).await;
        assert_eq!(agg.poll_count(), 1);
    }

    #[tokio::test]
    async fn at_leaderboard_04_teardown_and_non_terminal_phase_suppress_polling() {
        let mut agg = LeaderboardAggregator::new(
            SessionId::new("qs_00000001").unwrap(),
            RoundTiming::mvp_v1(),
        );
        assert!(!agg.should_poll(QuizPhase::Question { round_index: 2 }));
        agg.teardown();
        assert!(!agg.should_poll(QuizPhase::Leaderboard));
    }

    #[tokio::test]
    async fn at_leaderboard_05_late_older_snapshot_does_not_replace_newer() {
        let clock = TestClock::at(1_000);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa"]).await;
        let timing = RoundTiming::mvp_v1();

        let older = fetch_standing(&ledger, &sid, timing, TIMEOUT, WallClockMs(70_000)).await;
        ledger
            .write_submit_score(&sid, &pid("0xa"), 450)
            .await
            .unwrap();
        let newer = fetch_standing(&ledger, &sid, timing, TIMEOUT, WallClockMs(72_000)).await;

        let mut agg = LeaderboardAggregator::new(sid, timing);
        agg.apply(newer);
        let notices = agg.apply(older);
        assert!(notices.is_empty());

        let snap = agg.latest().unwrap();
        assert_eq!(snap.polled_at, WallClockMs(72_000));
        assert_eq!(snap.entries[0].score, 450);
        assert!(snap.entries[0].submitted);
        assert_eq!(agg.poll_count(), 2);
    }
}
