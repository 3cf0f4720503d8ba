#![forbid(unsafe_code)]

use quizsync_kernel_contracts::ledger::LedgerSessionRecord;
use quizsync_kernel_contracts::session::{PlayerId, RoundTiming, ScoreTableId, SessionId};
use quizsync_kernel_contracts::WallClockMs;

use crate::ledger_store::{GameSessionRecord, LedgerEventRow, LedgerStore, StorageError};

/// Typed repository interface for the quiz ledger tables.
pub trait QuizLedgerRepo {
    fn insert_session_row(
        &mut self,
        host_id: PlayerId,
        timing: RoundTiming,
        reward_per_winner: u64,
        now: WallClockMs,
    ) -> Result<SessionId, StorageError>;
    fn append_player_row(
        &mut self,
        session_id: &SessionId,
        player_id: PlayerId,
        now: WallClockMs,
    ) -> Result<(), StorageError>;
    fn start_session_row(
        &mut self,
        session_id: &SessionId,
        caller: &PlayerId,
        now: WallClockMs,
    ) -> Result<WallClockMs, StorageError>;
    fn insert_score_row(
        &mut self,
        session_id: &SessionId,
        player_id: PlayerId,
        score: u64,
        now: WallClockMs,
    ) -> Result<(), StorageError>;
    fn finalize_session_row(
        &mut self,
        session_id: &SessionId,
        caller: &PlayerId,
        winners: &[PlayerId],
        now: WallClockMs,
    ) -> Result<(), StorageError>;
    fn claim_reward_row(
        &mut self,
        session_id: &SessionId,
        player_id: &PlayerId,
        now: WallClockMs,
    ) -> Result<u64, StorageError>;

    fn session_row(&self, session_id: &SessionId) -> Option<&GameSessionRecord>;
    fn session_wire_row(&self, session_id: &SessionId) -> Option<LedgerSessionRecord>;
    fn score_row(&self, table_id: &ScoreTableId, player_id: &PlayerId) -> Option<u64>;
    fn ledger_event_rows(&self) -> &[LedgerEventRow];
}

impl QuizLedgerRepo for LedgerStore {
    fn insert_session_row(
        &mut self,
        host_id: PlayerId,
        timing: RoundTiming,
        reward_per_winner: u64,
        now: WallClockMs,
    ) -> Result<SessionId, StorageError> {
        self.create_session(host_id, timing, reward_per_winner, now)
    }

    fn append_player_row(
        &mut self,
        session_id: &SessionId,
        player_id: PlayerId,
        now: WallClockMs,
    ) -> Result<(), StorageError> {
        self.join_session(session_id, player_id, now)
    }

    fn start_session_row(
        &mut self,
        session_id: &SessionId,
        caller: &PlayerId,
        now: WallClockMs,
    ) -> Result<WallClockMs, StorageError> {
        self.start_session(session_id, caller, now)
    }

    fn insert_score_row(
        &mut self,
        session_id: &SessionId,
        player_id: PlayerId,
        score: u64,
        now: WallClockMs,
    ) -> Result<(), StorageError> {
        self.submit_score(session_id, player_id, score, now)
    }

    fn finalize_session_row(
        &mut self,
        session_id: &SessionId,
        caller: &PlayerId,
        winners: &[PlayerId],
        now: WallClockMs,
    ) -> Result<(), StorageError> {
        self.finalize_session(session_id, caller, winners, now)
    }

    fn claim_reward_row(
        &mut self,
        session_id: &SessionId,
        player_id: &PlayerId,
        now: WallClockMs,
    ) -> Result<u64, StorageError> {
        self.claim_reward(session_id, player_id, now)
    }

    fn session_row(&self, session_id: &SessionId) -> Option<&GameSessionRecord> {
        self.get_session(session_id)
    }

    fn session_wire_row(&self, session_id: &SessionId) -> Option<LedgerSessionRecord> {
        self.get_session(session_id).map(GameSessionRecord::to_wire)
    }

    fn score_row(&self, table_id: &ScoreTableId, player_id: &PlayerId) -> Option<u64> {
        self.score_entry(table_id, player_id)
    }

    fn ledger_event_rows(&self) -> &[LedgerEventRow] {
        self.ledger_events()
    }
}
