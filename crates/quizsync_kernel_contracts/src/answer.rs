#![forbid(unsafe_code)]

use crate::session::PlayerId;
use crate::{ContractViolation, SchemaVersion, Validate, WallClockMs};

pub const ANSWER_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// One player's single answer for one round. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerAnswer {
    pub schema_version: SchemaVersion,
    pub player_id: PlayerId,
    pub round_index: u32,
    pub choice_index: u8,
    pub click_timestamp_ms: WallClockMs,
    pub time_taken_ms: u64,
    /// Score computed at click time. Counted only if the choice turns out correct.
    pub locked_score: u32,
}

impl PlayerAnswer {
    pub fn v1(
        player_id: PlayerId,
        round_index: u32,
        choice_index: u8,
        click_timestamp_ms: WallClockMs,
        time_taken_ms: u64,
        locked_score: u32,
    ) -> Result<Self, ContractViolation> {
        let a = Self {
            schema_version: ANSWER_CONTRACT_VERSION,
            player_id,
            round_index,
            choice_index,
            click_timestamp_ms,
            time_taken_ms,
            locked_score,
        };
        a.validate()?;
        Ok(a)
    }
}

impl Validate for PlayerAnswer {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != ANSWER_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "player_answer.schema_version",
                reason: "must match ANSWER_CONTRACT_VERSION",
            });
        }
        self.player_id.validate()?;
        if self.locked_score == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "player_answer.locked_score",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

/// Outcome of the once-per-round accumulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundVerdict {
    pub round_index: u32,
    pub answered: bool,
    pub correct: bool,
    pub awarded: u32,
}

impl RoundVerdict {
    pub fn unanswered(round_index: u32) -> Self {
        Self {
            round_index,
            answered: false,
            correct: false,
            awarded: 0,
        }
    }
}
