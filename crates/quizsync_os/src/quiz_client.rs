#![forbid(unsafe_code)]

use std::time::Duration;

use quizsync_engines::phase::{PhaseConfig, PhaseRuntime};
use quizsync_engines::score_fn::ScoreFormula;
use quizsync_kernel_contracts::answer::{PlayerAnswer, RoundVerdict};
use quizsync_kernel_contracts::question::QuestionBank;
use quizsync_kernel_contracts::round::{PhaseTransition, QuizPhase};
use quizsync_kernel_contracts::session::{PlayerId, PlayerRole, Session, SessionLifecycle};
use quizsync_kernel_contracts::standing::StandingSnapshot;
use quizsync_kernel_contracts::{ContractViolation, Validate, WallClockMs};
use tracing::{debug, info, warn};

use crate::leaderboard::{fetch_standing, LeaderboardAggregator, StandingFetch};
use crate::ledger_client::{LedgerClient, LedgerError};
use crate::notice::{ClientNotice, NoticeKind};
use crate::reward_finalizer::{
    dispatch_finalize, FinalizeError, FinalizeStatus, FinalizeTicket, RewardFinalizer,
};
use crate::score_capture::{ScoreCaptureRuntime, SelectOutcome};
use crate::score_submitter::{
    dispatch_submission, ScoreSubmitter, SubmissionStatus, SubmitDecision, SubmitTicket,
};
use crate::session_sync::{fetch_session, LobbyStatus, SessionView};

pub mod reason_codes {
    use quizsync_kernel_contracts::ReasonCodeId;

    // Quiz client reason-code namespace.
    pub const CLIENT_STALE_CLOCK: ReasonCodeId = ReasonCodeId(0x5154_0001);
    pub const CLIENT_START_ANCHOR_CHANGED: ReasonCodeId = ReasonCodeId(0x5154_0002);
    pub const CLIENT_SESSION_MISMATCH: ReasonCodeId = ReasonCodeId(0x5154_0003);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub tick_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub ledger_timeout_ms: u64,
    pub winner_count: usize,
    pub score_formula: ScoreFormula,
    pub phase: PhaseConfig,
}

impl ClientConfig {
    pub fn mvp_v1() -> Self {
        Self {
            tick_interval_ms: 1_000,
            poll_interval_ms: 2_000,
            ledger_timeout_ms: 10_000,
            winner_count: 1,
            score_formula: ScoreFormula::mvp_v1(),
            phase: PhaseConfig::mvp_v1(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }
}

impl Validate for ClientConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.tick_interval_ms == 0 || self.poll_interval_ms == 0 || self.ledger_timeout_ms == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "client_config.intervals",
                reason: "must be > 0",
            });
        }
        if self.winner_count == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "client_config.winner_count",
                reason: "must be >= 1",
            });
        }
        self.score_formula.validate()
    }
}

/// What one tick produced. The caller dispatches `submit_ticket` and polls when `poll_due`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTick {
    pub phase: QuizPhase,
    pub round_index: Option<u32>,
    pub remaining_ms: Option<u64>,
    pub transition: Option<PhaseTransition>,
    pub verdicts: Vec<RoundVerdict>,
    /// Present on at most one tick per client.
    pub submit_ticket: Option<SubmitTicket>,
    pub poll_due: bool,
}

/// One local participant in one session instance.
#[derive(Debug, Clone)]
pub struct QuizClient {
    session: Session,
    local: PlayerId,
    role: PlayerRole,
    questions: QuestionBank,
    config: ClientConfig,
    phase: PhaseRuntime,
    capture: ScoreCaptureRuntime,
    submitter: ScoreSubmitter,
    leaderboard: LeaderboardAggregator,
    finalizer: RewardFinalizer,
    notices: Vec<ClientNotice>,
    last_poll_at: Option<WallClockMs>,
}

impl QuizClient {
    pub fn new(
        session: Session,
        local: PlayerId,
        questions: QuestionBank,
        config: ClientConfig,
    ) -> Result<Self, ContractViolation> {
        session.validate()?;
        config.validate()?;
        if questions.round_count() < session.timing.round_count {
            return Err(ContractViolation::InvalidValue {
                field: "quiz_client.questions",
                reason: "must cover every round of the session",
            });
        }
        let role = session.role_of(&local);
        let phase = PhaseRuntime::new(session.timing, config.phase)?;
        let capture = ScoreCaptureRuntime::new(local.clone(), role, config.score_formula)?;
        let submitter = ScoreSubmitter::new(session.session_id.clone(), local.clone(), role);
        let leaderboard = LeaderboardAggregator::new(session.session_id.clone(), session.timing);
        let finalizer = RewardFinalizer::new(session.session_id.clone(), local.clone(), role);
        Ok(Self {
            session,
            local,
            role,
            questions,
            config,
            phase,
            capture,
            submitter,
            leaderboard,
            finalizer,
            notices: Vec::new(),
            last_poll_at: None,
        })
    }

    /// Folds a fresh ledger read into the local session. Once a start timestamp has been seen it
    /// never changes locally.
    pub fn refresh_session(&mut self, view: SessionView) {
        self.notices.extend(view.notices);
        let fresh = view.session;
        if fresh.session_id != self.session.session_id {
            warn!(expected = %self.session.session_id, got = %fresh.session_id, "session read for another id ignored");
            self.notices.push(ClientNotice::malformed(
                reason_codes::CLIENT_SESSION_MISMATCH,
                format!("ledger returned session {}", fresh.session_id),
            ));
            return;
        }

        let start_timestamp_ms = match (self.session.start_timestamp_ms, fresh.start_timestamp_ms) {
            (Some(kept), Some(seen)) if kept != seen => {
                warn!(session_id = %self.session.session_id, kept = kept.0, seen = seen.0, "start timestamp changed on ledger; keeping first");
                self.notices.push(ClientNotice::malformed(
                    reason_codes::CLIENT_START_ANCHOR_CHANGED,
                    "start timestamp changed after activation; ignored",
                ));
                Some(kept)
            }
            (Some(kept), _) => Some(kept),
            (None, seen) => {
                if let Some(s) = seen {
                    info!(session_id = %self.session.session_id, start = s.0, "session start observed");
                }
                seen
            }
        };

        self.session.players = fresh.players;
        self.session.score_table_id = fresh.score_table_id;
        self.session.start_timestamp_ms = start_timestamp_ms;
        // An anchored session stays at least Active locally even if the read degraded.
        self.session.lifecycle = match (start_timestamp_ms, fresh.lifecycle) {
            (Some(_), SessionLifecycle::Waiting) => SessionLifecycle::Active,
            (_, l) => l,
        };
    }

    pub fn tick(&mut self, now: WallClockMs) -> ClientTick {
        let step = self.phase.step(self.session.start_timestamp_ms, now);
        if step.stale_clock {
            warn!(session_id = %self.session.session_id, now = now.0, "clock reading behind observed phase; holding");
            self.notices.push(ClientNotice::new(
                NoticeKind::LocalClock,
                reason_codes::CLIENT_STALE_CLOCK,
                "local clock stepped backwards; phase held",
            ));
        }

        if let Some(r) = step.round_entered {
            self.capture.on_round_entered(r);
        }

        let verdicts: Vec<RoundVerdict> = step
            .rounds_to_evaluate
            .iter()
            .map(|&r| match self.questions.card_for_round(r) {
                Some(card) => self.capture.accumulate_round(r, card.correct_choice),
                None => RoundVerdict::unanswered(r),
            })
            .collect();

        if let Some(t) = &step.transition {
            info!(
                session_id = %self.session.session_id,
                player_id = %self.local,
                from = ?t.from,
                to = ?t.to,
                reason_code = t.reason_code.0,
                cumulative_score = self.capture.cumulative_score(),
                "phase transition"
            );
        }

        let submit_ticket = match self
            .submitter
            .arm(step.phase, self.capture.cumulative_score())
        {
            SubmitDecision::Dispatch(ticket) => Some(ticket),
            _ => None,
        };

        let poll_due = self.leaderboard.should_poll(step.phase)
            && self.last_poll_at.map_or(true, |last| {
                now.saturating_since(last) >= self.config.poll_interval_ms
            });
        if poll_due {
            self.last_poll_at = Some(now);
        }

        ClientTick {
            phase: step.phase,
            round_index: step.phase.round_index(),
            remaining_ms: step.reading.filter(|r| !r.terminal).map(|r| r.remaining_ms),
            transition: step.transition,
            verdicts,
            submit_ticket,
            poll_due,
        }
    }

    pub fn select(
        &mut self,
        choice_index: u8,
        now: WallClockMs,
    ) -> Result<SelectOutcome, ContractViolation> {
        let Some(start) = self.session.start_timestamp_ms else {
            return Ok(SelectOutcome::IgnoredPhaseClosed);
        };
        // The click must land in the question window the last tick opened.
        let observed = self.phase.phase();
        let at_click = self.phase.phase_at(start, now);
        let QuizPhase::Question { round_index } = at_click else {
            debug!(player_id = %self.local, phase = ?at_click, "selection ignored: phase closed at click");
            return Ok(SelectOutcome::IgnoredPhaseClosed);
        };
        if at_click != observed {
            debug!(player_id = %self.local, ?observed, ?at_click, "selection ignored: round not opened by a tick");
            return Ok(SelectOutcome::IgnoredPhaseClosed);
        }
        let Some(card) = self.questions.card_for_round(round_index) else {
            return Ok(SelectOutcome::IgnoredPhaseClosed);
        };
        self.capture
            .select(choice_index, at_click, now, start, self.session.timing, card)
    }

    pub fn answer_for(&self, round_index: u32) -> Option<&PlayerAnswer> {
        self.capture.answer_for(round_index)
    }

    pub fn record_submission(&mut self, result: &Result<(), LedgerError>) {
        self.submitter.record_result(result);
        if let Err(e) = result {
            self.notices.push(ClientNotice::from_ledger_error(e));
        }
    }

    pub fn apply_standing(&mut self, result: Result<StandingFetch, LedgerError>) {
        let notices = self.leaderboard.apply(result);
        self.notices.extend(notices);
    }

    pub fn prepare_finalize(&mut self) -> Result<FinalizeTicket, FinalizeError> {
        self.finalizer
            .prepare(self.leaderboard.latest(), self.config.winner_count)
    }

    pub fn record_finalize(&mut self, ticket: &FinalizeTicket, result: &Result<(), LedgerError>) {
        self.finalizer.record(ticket, result);
        if let Err(e) = result {
            self.notices.push(ClientNotice::from_ledger_error(e));
        }
    }

    /// Stops leaderboard polling. Ticks keep deriving the phase.
    pub fn teardown(&mut self) {
        self.leaderboard.teardown();
    }

    pub fn drain_notices(&mut self) -> Vec<ClientNotice> {
        std::mem::take(&mut self.notices)
    }

    pub async fn sync_session(&mut self, ledger: &dyn LedgerClient) -> Result<(), LedgerError> {
        let fetched = fetch_session(
            ledger,
            &self.session.session_id,
            self.session.timing,
            self.config.ledger_timeout(),
        )
        .await;
        match fetched {
            Ok(view) => {
                self.refresh_session(view);
                Ok(())
            }
            Err(e) => {
                self.record_sync_error(&e);
                Err(e)
            }
        }
    }

    pub fn record_sync_error(&mut self, err: &LedgerError) {
        warn!(session_id = %self.session.session_id, error = %err, "session sync failed");
        self.notices.push(ClientNotice::from_ledger_error(err));
    }

    /// Ticks, then performs whatever the tick asked for: the final score write and the
    /// leaderboard poll.
    pub async fn tick_and_dispatch(
        &mut self,
        ledger: &dyn LedgerClient,
        now: WallClockMs,
    ) -> ClientTick {
        let tick = self.tick(now);
        if let Some(ticket) = &tick.submit_ticket {
            let result = dispatch_submission(ledger, ticket, self.config.ledger_timeout()).await;
            self.record_submission(&result);
        }
        if tick.poll_due {
            let result = fetch_standing(
                ledger,
                &self.session.session_id,
                self.session.timing,
                self.config.ledger_timeout(),
                now,
            )
            .await;
            self.apply_standing(result);
        }
        tick
    }

    pub async fn finalize(
        &mut self,
        ledger: &dyn LedgerClient,
    ) -> Result<Vec<PlayerId>, FinalizeError> {
        let ticket = self.prepare_finalize()?;
        let result = dispatch_finalize(ledger, &ticket, self.config.ledger_timeout()).await;
        self.record_finalize(&ticket, &result);
        result?;
        Ok(ticket.winners)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn local(&self) -> &PlayerId {
        &self.local
    }

    pub fn role(&self) -> PlayerRole {
        self.role
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn phase(&self) -> QuizPhase {
        self.phase.phase()
    }

    pub fn questions(&self) -> &QuestionBank {
        &self.questions
    }

    pub fn cumulative_score(&self) -> u64 {
        self.capture.cumulative_score()
    }

    pub fn submission_status(&self) -> &SubmissionStatus {
        self.submitter.status()
    }

    pub fn finalize_status(&self) -> &FinalizeStatus {
        self.finalizer.status()
    }

    pub fn standing(&self) -> Option<&StandingSnapshot> {
        self.leaderboard.latest()
    }

    pub fn lobby(&self) -> LobbyStatus {
        LobbyStatus::observe(&self.session, &self.local)
    }

    pub fn is_polling(&self) -> bool {
        self.leaderboard.is_active()
    }
}

#[cfg(test)]
mod tests {
    use quizsync_kernel_contracts::question::QuestionCard;
    use quizsync_kernel_contracts::session::{RoundTiming, SessionId};

    use super::*;
    use crate::ledger_client::test_support::*;
    use crate::ledger_client::InMemoryLedgerClient;

    const T0: u64 = 1_700_000_000_000;

    async fn client_for(ledger: &InMemoryLedgerClient, sid: &SessionId, who: &str) -> QuizClient {
        let view = fetch_session(ledger, sid, RoundTiming::mvp_v1(), Duration::from_secs(10))
            .await
            .unwrap();
        QuizClient::new(
            view.session,
            pid(who),
            QuestionBank::mvp_default(),
            ClientConfig::mvp_v1(),
        )
        .unwrap()
    }

    fn at(ms: u64) -> WallClockMs {
        WallClockMs(T0 + ms)
    }

    #[tokio::test]
    async fn at_client_01_full_game_submits_once_and_host_finalizes() {
        let clock = TestClock::at(T0);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa", "0xb"]).await;
        let mut a = client_for(&ledger, &sid, "0xa").await;
        let mut b = client_for(&ledger, &sid, "0xb").await;
        let mut host = client_for(&ledger, &sid, "0xhost").await;
        assert_eq!(host.role(), PlayerRole::Host);

        for c in [&mut a, &mut b, &mut host] {
            c.tick_and_dispatch(&ledger, at(0)).await;
        }
        assert!(matches!(a.select(1, at(2_000)).unwrap(), SelectOutcome::Captured(_)));
        assert!(matches!(b.select(3, at(2_500)).unwrap(), SelectOutcome::Captured(_)));
        assert_eq!(host.select(1, at(2_000)).unwrap(), SelectOutcome::IgnoredHost);

        let fb0 = a.tick_and_dispatch(&ledger, at(15_000)).await;
        assert_eq!(fb0.phase, QuizPhase::Feedback { round_index: 0 });
        assert_eq!(fb0.verdicts[0].awarded, 690);
        assert_eq!(a.select(2, at(15_500)).unwrap(), SelectOutcome::IgnoredPhaseClosed);

        a.tick_and_dispatch(&ledger, at(20_000)).await;
        assert!(matches!(a.select(2, at(21_000)).unwrap(), SelectOutcome::Captured(_)));
        a.tick_and_dispatch(&ledger, at(40_000)).await;
        assert!(matches!(a.select(1, at(41_000)).unwrap(), SelectOutcome::Captured(_)));

        let end_a = a.tick_and_dispatch(&ledger, at(60_000)).await;
        assert_eq!(end_a.phase, QuizPhase::Leaderboard);
        assert_eq!(end_a.submit_ticket.as_ref().map(|t| t.score), Some(1_410));
        assert_eq!(a.submission_status(), &SubmissionStatus::Succeeded);
        let again = a.tick_and_dispatch(&ledger, at(61_000)).await;
        assert!(again.submit_ticket.is_none());

        let end_b = b.tick_and_dispatch(&ledger, at(60_000)).await;
        assert_eq!(end_b.submit_ticket.as_ref().map(|t| t.score), Some(0));

        let end_host = host.tick_and_dispatch(&ledger, at(60_000)).await;
        assert!(end_host.submit_ticket.is_none());
        assert!(end_host.poll_due);
        let standing = host.standing().unwrap();
        assert_eq!(standing.entries[0].player_id, pid("0xa"));
        assert_eq!(standing.entries[0].score, 1_410);

        let winners = host.finalize(&ledger).await.unwrap();
        assert_eq!(winners, vec![pid("0xa")]);

        host.tick_and_dispatch(&ledger, at(62_000)).await;
        assert!(host.standing().unwrap().session_finalized);
        assert!(!host.is_polling());
        assert_eq!(
            ledger
                .write_claim_reward(&sid, &pid("0xa"))
                .await
                .unwrap(),
            100
        );
    }

    #[tokio::test]
    async fn at_client_02_skipped_ticks_evaluate_every_round_before_submission() {
        let clock = TestClock::at(T0);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa"]).await;
        let mut a = client_for(&ledger, &sid, "0xa").await;

        a.tick(at(1_000));
        a.select(1, at(1_000)).unwrap();
        let late = a.tick(at(65_000));
        let rounds: Vec<u32> = late.verdicts.iter().map(|v| v.round_index).collect();
        assert_eq!(rounds, vec![0, 1, 2]);
        assert_eq!(late.submit_ticket.map(|t| t.score), Some(720));
    }

    #[tokio::test]
    async fn at_client_03_unstarted_session_ignores_selection() {
        let clock = TestClock::at(T0);
        let ledger = ledger_at(&clock);
        let sid = ledger
            .write_create_session(&pid("0xhost"), RoundTiming::mvp_v1(), 0)
            .await
            .unwrap();
        ledger.write_join_session(&sid, &pid("0xa")).await.unwrap();
        let mut a = client_for(&ledger, &sid, "0xa").await;

        let t = a.tick(at(5_000));
        assert_eq!(t.phase, QuizPhase::Unstarted);
        assert!(t.remaining_ms.is_none());
        assert_eq!(a.select(1, at(5_000)).unwrap(), SelectOutcome::IgnoredPhaseClosed);
        assert!(!a.lobby().ready_to_enter);

        ledger.write_start_session(&sid, &pid("0xhost")).await.unwrap();
        a.sync_session(&ledger).await.unwrap();
        assert!(a.lobby().ready_to_enter);
        let t = a.tick(at(1_000));
        assert_eq!(t.phase, QuizPhase::Question { round_index: 0 });
        assert_eq!(t.remaining_ms, Some(19_000));
    }

    #[tokio::test]
    async fn at_client_04_start_anchor_is_immutable_once_seen() {
        let clock = TestClock::at(T0);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa"]).await;
        let mut a = client_for(&ledger, &sid, "0xa").await;

        let mut shifted = ledger.read_session(&sid).await.unwrap();
        shifted.start_timestamp_ms = Some(T0 + 7_000);
        let view = SessionView::from_record(&shifted, RoundTiming::mvp_v1()).unwrap();
        a.refresh_session(view);

        assert_eq!(a.session().start_timestamp_ms, Some(WallClockMs(T0)));
        let codes: Vec<_> = a.drain_notices().iter().map(|n| n.reason_code).collect();
        assert_eq!(codes, vec![reason_codes::CLIENT_START_ANCHOR_CHANGED]);
        assert!(a.drain_notices().is_empty());
    }

    #[tokio::test]
    async fn at_client_05_stale_clock_holds_phase_and_notifies() {
        let clock = TestClock::at(T0);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa"]).await;
        let mut a = client_for(&ledger, &sid, "0xa").await;

        a.tick(at(21_000));
        let back = a.tick(at(19_000));
        assert_eq!(back.phase, QuizPhase::Question { round_index: 1 });
        assert!(back.verdicts.is_empty());
        let notices = a.drain_notices();
        assert_eq!(notices[0].reason_code, reason_codes::CLIENT_STALE_CLOCK);
        assert_eq!(notices[0].kind, NoticeKind::LocalClock);
    }

    #[tokio::test]
    async fn at_client_06_poll_cadence_follows_config() {
        let clock = TestClock::at(T0);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa"]).await;
        let mut a = client_for(&ledger, &sid, "0xa").await;

        assert!(!a.tick(at(59_000)).poll_due);
        assert!(a.tick(at(60_000)).poll_due);
        assert!(!a.tick(at(61_000)).poll_due);
        assert!(a.tick(at(62_000)).poll_due);
        a.teardown();
        assert!(!a.tick(at(64_000)).poll_due);
    }

    #[tokio::test]
    async fn at_client_07_bank_must_cover_every_round() {
        let clock = TestClock::at(T0);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa"]).await;
        let view = fetch_session(&ledger, &sid, RoundTiming::mvp_v1(), Duration::from_secs(10))
            .await
            .unwrap();
        let short = QuestionBank::v1(vec![QuestionCard::v1(
            "Q",
            vec!["A".to_string(), "B".to_string()],
            0,
        )
        .unwrap()])
        .unwrap();
        assert!(QuizClient::new(view.session.clone(), pid("0xa"), short, ClientConfig::mvp_v1()).is_err());
        assert_eq!(view.session.lifecycle, SessionLifecycle::Active);
    }

    #[tokio::test]
    async fn at_client_08_select_between_ticks_uses_clock_at_click() {
        let clock = TestClock::at(T0);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa"]).await;
        let mut a = client_for(&ledger, &sid, "0xa").await;

        a.tick(at(14_900));
        // Feedback opened at 15 000 even though no tick has run since.
        assert_eq!(a.select(2, at(15_800)).unwrap(), SelectOutcome::IgnoredPhaseClosed);
        // Round 1 is current by the clock, but no tick has opened it yet.
        assert_eq!(a.select(1, at(20_500)).unwrap(), SelectOutcome::IgnoredPhaseClosed);
        assert!(a.answer_for(0).is_none());

        let opened = a.tick(at(20_600));
        assert_eq!(opened.phase, QuizPhase::Question { round_index: 1 });
        assert_eq!(opened.verdicts, vec![RoundVerdict::unanswered(0)]);
        let SelectOutcome::Captured(answer) = a.select(1, at(21_000)).unwrap() else {
            panic!("round 1 answer should be captured");
        };
        assert_eq!(answer.round_index, 1);
        assert_eq!(answer.time_taken_ms, 1_000);
        assert_eq!(answer.locked_score, 720);
        assert!(a.answer_for(0).is_none());
    }
}
