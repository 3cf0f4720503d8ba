#![forbid(unsafe_code)]

use crate::common::validate_token;
use crate::{ContractViolation, SchemaVersion, Validate, WallClockMs};

pub const SESSION_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MAX_ID_LEN: usize = 128;
pub const MAX_PLAYERS_PER_SESSION: usize = 64;
pub const MAX_ROUND_COUNT: u32 = 100;
pub const MIN_ROUND_DURATION_MS: u64 = 1_000;
pub const MAX_ROUND_DURATION_MS: u64 = 600_000;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(id.into());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Every session owns exactly one score table on the ledger.
    pub fn score_table_id(&self) -> ScoreTableId {
        ScoreTableId(format!("{}.scores", self.0))
    }
}

impl Validate for SessionId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("session_id", &self.0, MAX_ID_LEN)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Player identity (account address). Compared case-insensitively, so it is stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(id.into().to_ascii_lowercase());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for PlayerId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("player_id", &self.0, MAX_ID_LEN)?;
        if self.0.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(ContractViolation::InvalidValue {
                field: "player_id",
                reason: "must be lowercase",
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScoreTableId(String);

impl ScoreTableId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(id.into());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ScoreTableId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("score_table_id", &self.0, MAX_ID_LEN + 8)
    }
}

impl std::fmt::Display for ScoreTableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger-side lifecycle of a session. Encoded on the wire as 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionLifecycle {
    Waiting,
    Active,
    Ended,
}

impl SessionLifecycle {
    pub fn code(self) -> u8 {
        match self {
            SessionLifecycle::Waiting => 0,
            SessionLifecycle::Active => 1,
            SessionLifecycle::Ended => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SessionLifecycle::Waiting),
            1 => Some(SessionLifecycle::Active),
            2 => Some(SessionLifecycle::Ended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerRole {
    /// Session creator. Spectates, never answers or submits a score.
    Host,
    Player,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundTiming {
    pub round_duration_ms: u64,
    pub round_count: u32,
}

impl RoundTiming {
    pub fn v1(round_duration_ms: u64, round_count: u32) -> Result<Self, ContractViolation> {
        let t = Self {
            round_duration_ms,
            round_count,
        };
        t.validate()?;
        Ok(t)
    }

    pub fn mvp_v1() -> Self {
        Self {
            round_duration_ms: 20_000,
            round_count: 3,
        }
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.round_duration_ms
            .saturating_mul(u64::from(self.round_count))
    }
}

impl Validate for RoundTiming {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !(MIN_ROUND_DURATION_MS..=MAX_ROUND_DURATION_MS).contains(&self.round_duration_ms) {
            return Err(ContractViolation::InvalidRange {
                field: "round_timing.round_duration_ms",
                min: MIN_ROUND_DURATION_MS as f64,
                max: MAX_ROUND_DURATION_MS as f64,
                got: self.round_duration_ms as f64,
            });
        }
        if self.round_count == 0 || self.round_count > MAX_ROUND_COUNT {
            return Err(ContractViolation::InvalidRange {
                field: "round_timing.round_count",
                min: 1.0,
                max: MAX_ROUND_COUNT as f64,
                got: self.round_count as f64,
            });
        }
        Ok(())
    }
}

/// Local view of one game instance as last read from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub schema_version: SchemaVersion,
    pub session_id: SessionId,
    pub host_id: PlayerId,
    /// Join order. Unique.
    pub players: Vec<PlayerId>,
    pub lifecycle: SessionLifecycle,
    /// Fixed at activation, never mutated afterwards. `None` until the host starts the game.
    pub start_timestamp_ms: Option<WallClockMs>,
    pub timing: RoundTiming,
    pub score_table_id: ScoreTableId,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        session_id: SessionId,
        host_id: PlayerId,
        players: Vec<PlayerId>,
        lifecycle: SessionLifecycle,
        start_timestamp_ms: Option<WallClockMs>,
        timing: RoundTiming,
        score_table_id: ScoreTableId,
    ) -> Result<Self, ContractViolation> {
        let s = Self {
            schema_version: SESSION_CONTRACT_VERSION,
            session_id,
            host_id,
            players,
            lifecycle,
            start_timestamp_ms,
            timing,
            score_table_id,
        };
        s.validate()?;
        Ok(s)
    }

    pub fn role_of(&self, player: &PlayerId) -> PlayerRole {
        if *player == self.host_id {
            PlayerRole::Host
        } else {
            PlayerRole::Player
        }
    }

    pub fn has_player(&self, player: &PlayerId) -> bool {
        self.players.iter().any(|p| p == player)
    }
}

impl Validate for Session {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != SESSION_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "session.schema_version",
                reason: "must match SESSION_CONTRACT_VERSION",
            });
        }
        self.session_id.validate()?;
        self.host_id.validate()?;
        self.score_table_id.validate()?;
        self.timing.validate()?;
        if self.players.len() > MAX_PLAYERS_PER_SESSION {
            return Err(ContractViolation::InvalidValue {
                field: "session.players",
                reason: "exceeds MAX_PLAYERS_PER_SESSION",
            });
        }
        for (i, p) in self.players.iter().enumerate() {
            p.validate()?;
            if self.players[..i].contains(p) {
                return Err(ContractViolation::InvalidValue {
                    field: "session.players",
                    reason: "must be unique",
                });
            }
        }
        match (self.lifecycle, self.start_timestamp_ms.is_some()) {
            (SessionLifecycle::Waiting, true) => {
                return Err(ContractViolation::InvalidValue {
                    field: "session.start_timestamp_ms",
                    reason: "must be None while lifecycle=Waiting",
                });
            }
            (SessionLifecycle::Active, false) => {
                return Err(ContractViolation::InvalidValue {
                    field: "session.start_timestamp_ms",
                    reason: "must be Some(...) when lifecycle=Active",
                });
            }
            _ => {}
        }
        Ok(())
    }
}
