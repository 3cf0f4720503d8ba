#![forbid(unsafe_code)]

use crate::{ContractViolation, ReasonCodeId, SchemaVersion, Validate, WallClockMs};

pub const ROUND_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Where the shared timeline is for one client at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundClockReading {
    pub elapsed_ms: u64,
    /// May be >= round_count; that is the terminal condition.
    pub round_index: u32,
    pub time_in_round_ms: u64,
    pub remaining_ms: u64,
    pub terminal: bool,
}

impl Validate for RoundClockReading {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.remaining_ms == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "round_clock_reading.remaining_ms",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuizPhase {
    /// No start timestamp yet; no timer activity.
    Unstarted,
    Question { round_index: u32 },
    /// Trailing window of a round: correctness is revealed, answers are closed.
    Feedback { round_index: u32 },
    /// Terminal for the session instance.
    Leaderboard,
}

impl QuizPhase {
    pub fn round_index(self) -> Option<u32> {
        match self {
            QuizPhase::Question { round_index } | QuizPhase::Feedback { round_index } => {
                Some(round_index)
            }
            QuizPhase::Unstarted | QuizPhase::Leaderboard => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == QuizPhase::Leaderboard
    }

    pub fn accepts_answers(self) -> bool {
        matches!(self, QuizPhase::Question { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseTransition {
    pub schema_version: SchemaVersion,
    pub from: QuizPhase,
    pub to: QuizPhase,
    pub reason_code: ReasonCodeId,
    pub t_event: WallClockMs,
}

impl PhaseTransition {
    pub fn v1(
        from: QuizPhase,
        to: QuizPhase,
        reason_code: ReasonCodeId,
        t_event: WallClockMs,
    ) -> Result<Self, ContractViolation> {
        let t = Self {
            schema_version: ROUND_CONTRACT_VERSION,
            from,
            to,
            reason_code,
            t_event,
        };
        t.validate()?;
        Ok(t)
    }
}

impl Validate for PhaseTransition {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != ROUND_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "phase_transition.schema_version",
                reason: "must match ROUND_CONTRACT_VERSION",
            });
        }
        if self.from == self.to {
            return Err(ContractViolation::InvalidValue {
                field: "phase_transition.to",
                reason: "must differ from phase_transition.from",
            });
        }
        if self.from == QuizPhase::Leaderboard {
            return Err(ContractViolation::InvalidValue {
                field: "phase_transition.from",
                reason: "Leaderboard is terminal",
            });
        }
        if self.reason_code.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "phase_transition.reason_code",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_round_01_leaderboard_is_never_a_transition_source() {
        let t = PhaseTransition::v1(
            QuizPhase::Leaderboard,
            QuizPhase::Question { round_index: 0 },
            ReasonCodeId(1),
            WallClockMs(1),
        );
        assert!(t.is_err());
    }

    #[test]
    fn at_round_02_only_question_accepts_answers() {
        assert!(QuizPhase::Question { round_index: 1 }.accepts_answers());
        assert!(!QuizPhase::Feedback { round_index: 1 }.accepts_answers());
        assert!(!QuizPhase::Unstarted.accepts_answers());
        assert!(!QuizPhase::Leaderboard.accepts_answers());
    }
}
