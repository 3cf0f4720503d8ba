#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use quizsync_kernel_contracts::ledger::LedgerSessionRecord;
use quizsync_kernel_contracts::session::{
    PlayerId, RoundTiming, ScoreTableId, SessionId, SessionLifecycle, MAX_PLAYERS_PER_SESSION,
};
use quizsync_kernel_contracts::{ContractViolation, SchemaVersion, Validate, WallClockMs};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("{table}: unknown key '{key}'")]
    ForeignKeyViolation { table: &'static str, key: String },
    #[error("{table}: duplicate key '{key}'")]
    DuplicateKey { table: &'static str, key: String },
    #[error("{table}: {reason}")]
    InvalidState { table: &'static str, reason: &'static str },
    #[error("{table}: '{key}' is not authorized")]
    Unauthorized { table: &'static str, key: String },
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSessionRecord {
    pub schema_version: SchemaVersion,
    pub session_id: SessionId,
    pub host_id: PlayerId,
    pub players: Vec<PlayerId>,
    pub lifecycle: SessionLifecycle,
    pub start_timestamp_ms: Option<WallClockMs>,
    pub timing: RoundTiming,
    pub reward_per_winner: u64,
    pub winners: Vec<PlayerId>,
    pub created_at: WallClockMs,
    pub finalized_at: Option<WallClockMs>,
}

impl GameSessionRecord {
    pub fn score_table_id(&self) -> ScoreTableId {
        self.session_id.score_table_id()
    }

    pub fn to_wire(&self) -> LedgerSessionRecord {
        LedgerSessionRecord {
            session_id: self.session_id.as_str().to_string(),
            host_id: Some(self.host_id.as_str().to_string()),
            players: Some(
                self.players
                    .iter()
                    .map(|p| p.as_str().to_string())
                    .collect(),
            ),
            state: Some(self.lifecycle.code()),
            start_timestamp_ms: self.start_timestamp_ms.map(|t| t.0),
            round_duration_ms: Some(self.timing.round_duration_ms),
            round_count: Some(self.timing.round_count),
            score_table_id: Some(self.score_table_id().as_str().to_string()),
            winners: self
                .winners
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
        }
    }
}

impl Validate for GameSessionRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.session_id.validate()?;
        self.host_id.validate()?;
        self.timing.validate()?;
        match (self.lifecycle, self.start_timestamp_ms.is_some()) {
            (SessionLifecycle::Waiting, true) => Err(ContractViolation::InvalidValue {
                field: "game_session_record.start_timestamp_ms",
                reason: "must be None while Waiting",
            }),
            (SessionLifecycle::Active, false) => Err(ContractViolation::InvalidValue {
                field: "game_session_record.start_timestamp_ms",
                reason: "must be set while Active",
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRow {
    pub score: u64,
    pub submitted_at: WallClockMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEventKind {
    SessionCreated,
    PlayerJoined,
    SessionStarted,
    ScoreSubmitted,
    SessionFinalized,
    RewardClaimed,
}

/// Append-only audit row for every accepted ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEventRow {
    pub event_id: u64,
    pub kind: LedgerEventKind,
    pub session_id: SessionId,
    pub actor: PlayerId,
    pub at: WallClockMs,
    pub amount: Option<u64>,
}

/// In-memory reference ledger.
///
/// Enforces the ledger-side guards the clients rely on: a start timestamp set once, score rows
/// written once per player, a single finalization and a single claim per pending reward.
#[derive(Debug, Clone, Default)]
pub struct LedgerStore {
    sessions: BTreeMap<SessionId, GameSessionRecord>,
    score_table_index: BTreeMap<ScoreTableId, SessionId>,
    scores: BTreeMap<(SessionId, PlayerId), ScoreRow>,
    pending_rewards: BTreeMap<(SessionId, PlayerId), u64>,
    events: Vec<LedgerEventRow>,
    next_session_seq: u64,
}

impl LedgerStore {
    pub fn new_in_memory() -> Self {
        Self {
            next_session_seq: 1,
            ..Self::default()
        }
    }

    pub fn create_session(
        &mut self,
        host_id: PlayerId,
        timing: RoundTiming,
        reward_per_winner: u64,
        now: WallClockMs,
    ) -> Result<SessionId, StorageError> {
        let seq = self.next_session_seq.max(1);
        let session_id = SessionId::new(format!("qs_{seq:08x}"))?;
        let record = GameSessionRecord {
            schema_version: SchemaVersion(1),
            session_id: session_id.clone(),
            host_id: host_id.clone(),
            players: Vec::new(),
            lifecycle: SessionLifecycle::Waiting,
            start_timestamp_ms: None,
            timing,
            reward_per_winner,
            winners: Vec::new(),
            created_at: now,
            finalized_at: None,
        };
        record.validate()?;
        if self.sessions.contains_key(&session_id) {
            return Err(StorageError::DuplicateKey {
                table: "sessions",
                key: session_id.as_str().to_string(),
            });
        }
        self.next_session_seq = seq.saturating_add(1);
        self.score_table_index
            .insert(record.score_table_id(), session_id.clone());
        self.sessions.insert(session_id.clone(), record);
        self.append_event(LedgerEventKind::SessionCreated, &session_id, host_id, now, None);
        Ok(session_id)
    }

    pub fn join_session(
        &mut self,
        session_id: &SessionId,
        player_id: PlayerId,
        now: WallClockMs,
    ) -> Result<(), StorageError> {
        let record = self.session_mut(session_id)?;
        if record.lifecycle != SessionLifecycle::Waiting {
            return Err(StorageError::InvalidState {
                table: "sessions.players",
                reason: "players may only join while Waiting",
            });
        }
        if record.host_id == player_id {
            return Err(StorageError::InvalidState {
                table: "sessions.players",
                reason: "host spectates and cannot join as a player",
            });
        }
        if record.players.contains(&player_id) {
            return Err(StorageError::DuplicateKey {
                table: "sessions.players",
                key: player_id.as_str().to_string(),
            });
        }
        if record.players.len() >= MAX_PLAYERS_PER_SESSION {
            return Err(StorageError::InvalidState {
                table: "sessions.players",
                reason: "session is full",
            });
        }
        record.players.push(player_id.clone());
        self.append_event(LedgerEventKind::PlayerJoined, session_id, player_id, now, None);
        Ok(())
    }

    /// Activates the session and fixes its start timestamp. Host only, once.
    pub fn start_session(
        &mut self,
        session_id: &SessionId,
        caller: &PlayerId,
        now: WallClockMs,
    ) -> Result<WallClockMs, StorageError> {
        let record = self.session_mut(session_id)?;
        if record.host_id != *caller {
            return Err(StorageError::Unauthorized {
                table: "sessions.start",
                key: caller.as_str().to_string(),
            });
        }
        if record.lifecycle != SessionLifecycle::Waiting || record.start_timestamp_ms.is_some() {
            return Err(StorageError::InvalidState {
                table: "sessions.start",
                reason: "session was already started",
            });
        }
        record.lifecycle = SessionLifecycle::Active;
        record.start_timestamp_ms = Some(now);
        self.append_event(
            LedgerEventKind::SessionStarted,
            session_id,
            caller.clone(),
            now,
            None,
        );
        Ok(now)
    }

    pub fn submit_score(
        &mut self,
        session_id: &SessionId,
        player_id: PlayerId,
        score: u64,
        now: WallClockMs,
    ) -> Result<(), StorageError> {
        let record = self.session(session_id)?;
        if record.lifecycle != SessionLifecycle::Active {
            return Err(StorageError::InvalidState {
                table: "scores",
                reason: "scores are accepted only while Active",
            });
        }
        if !record.players.contains(&player_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "scores.player_id",
                key: player_id.as_str().to_string(),
            });
        }
        let key = (session_id.clone(), player_id.clone());
        if self.scores.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                table: "scores",
                key: player_id.as_str().to_string(),
            });
        }
        self.scores.insert(
            key,
            ScoreRow {
                score,
                submitted_at: now,
            },
        );
        self.append_event(
            LedgerEventKind::ScoreSubmitted,
            session_id,
            player_id,
            now,
            Some(score),
        );
        Ok(())
    }

    /// Records the winners, allocates their pending rewards and ends the session.
    pub fn finalize_session(
        &mut self,
        session_id: &SessionId,
        caller: &PlayerId,
        winners: &[PlayerId],
        now: WallClockMs,
    ) -> Result<(), StorageError> {
        let record = self.session(session_id)?;
        if record.host_id != *caller {
            return Err(StorageError::Unauthorized {
                table: "sessions.finalize",
                key: caller.as_str().to_string(),
            });
        }
        if record.lifecycle != SessionLifecycle::Active {
            return Err(StorageError::InvalidState {
                table: "sessions.finalize",
                reason: "only an Active session can be finalized",
            });
        }
        if winners.is_empty() {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "sessions.finalize.winners",
                    reason: "must not be empty",
                },
            ));
        }
        for (i, w) in winners.iter().enumerate() {
            if !record.players.contains(w) {
                return Err(StorageError::ForeignKeyViolation {
                    table: "sessions.finalize.winners",
                    key: w.as_str().to_string(),
                });
            }
            if winners[..i].contains(w) {
                return Err(StorageError::DuplicateKey {
                    table: "sessions.finalize.winners",
                    key: w.as_str().to_string(),
                });
            }
        }

        let reward = record.reward_per_winner;
        let record = self.session_mut(session_id)?;
        record.lifecycle = SessionLifecycle::Ended;
        record.winners = winners.to_vec();
        record.finalized_at = Some(now);
        for w in winners {
            self.pending_rewards
                .insert((session_id.clone(), w.clone()), reward);
        }
        self.append_event(
            LedgerEventKind::SessionFinalized,
            session_id,
            caller.clone(),
            now,
            None,
        );
        Ok(())
    }

    pub fn claim_reward(
        &mut self,
        session_id: &SessionId,
        player_id: &PlayerId,
        now: WallClockMs,
    ) -> Result<u64, StorageError> {
        self.session(session_id)?;
        let amount = self
            .pending_rewards
            .remove(&(session_id.clone(), player_id.clone()))
            .ok_or_else(|| StorageError::ForeignKeyViolation {
                table: "pending_rewards",
                key: player_id.as_str().to_string(),
            })?;
        self.append_event(
            LedgerEventKind::RewardClaimed,
            session_id,
            player_id.clone(),
            now,
            Some(amount),
        );
        Ok(amount)
    }

    pub fn get_session(&self, session_id: &SessionId) -> Option<&GameSessionRecord> {
        self.sessions.get(session_id)
    }

    pub fn score_entry(&self, table_id: &ScoreTableId, player_id: &PlayerId) -> Option<u64> {
        let session_id = self.score_table_index.get(table_id)?;
        self.scores
            .get(&(session_id.clone(), player_id.clone()))
            .map(|row| row.score)
    }

    pub fn pending_reward(&self, session_id: &SessionId, player_id: &PlayerId) -> Option<u64> {
        self.pending_rewards
            .get(&(session_id.clone(), player_id.clone()))
            .copied()
    }

    pub fn ledger_events(&self) -> &[LedgerEventRow] {
        &self.events
    }

    fn session(&self, session_id: &SessionId) -> Result<&GameSessionRecord, StorageError> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| StorageError::ForeignKeyViolation {
                table: "sessions",
                key: session_id.as_str().to_string(),
            })
    }

    fn session_mut(
        &mut self,
        session_id: &SessionId,
    ) -> Result<&mut GameSessionRecord, StorageError> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| StorageError::ForeignKeyViolation {
                table: "sessions",
                key: session_id.as_str().to_string(),
            })
    }

    fn append_event(
        &mut self,
        kind: LedgerEventKind,
        session_id: &SessionId,
        actor: PlayerId,
        at: WallClockMs,
        amount: Option<u64>,
    ) {
        let event_id = (self.events.len() as u64).saturating_add(1);
        self.events.push(LedgerEventRow {
            event_id,
            kind,
            session_id: session_id.clone(),
            actor,
            at,
            amount,
        });
    }
}
