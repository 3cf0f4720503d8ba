#![forbid(unsafe_code)]

use quizsync_kernel_contracts::round::{PhaseTransition, QuizPhase, RoundClockReading};
use quizsync_kernel_contracts::session::RoundTiming;
use quizsync_kernel_contracts::{ContractViolation, Validate, WallClockMs};

use crate::round_clock::read_round_clock;

pub mod reason_codes {
    use quizsync_kernel_contracts::ReasonCodeId;

    // Phase controller reason-code namespace.
    pub const PHASE_QUESTION_OPEN: ReasonCodeId = ReasonCodeId(0x5150_0001);
    pub const PHASE_FEEDBACK_OPEN: ReasonCodeId = ReasonCodeId(0x5150_0002);
    pub const PHASE_LEADERBOARD_TERMINAL: ReasonCodeId = ReasonCodeId(0x5150_0003);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseConfig {
    /// Trailing part of each round shown as feedback.
    pub feedback_window_ms: u64,
}

impl PhaseConfig {
    pub fn mvp_v1() -> Self {
        Self {
            feedback_window_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTick {
    pub phase: QuizPhase,
    pub reading: Option<RoundClockReading>,
    pub transition: Option<PhaseTransition>,
    /// Set on the first tick observing a new round index.
    pub round_entered: Option<u32>,
    /// Rounds whose answers must be scored now, ascending. A round is listed on exactly one tick.
    pub rounds_to_evaluate: Vec<u32>,
    /// The reading pointed behind the phase already observed; the phase was held.
    pub stale_clock: bool,
}

/// Derives the local phase from the shared start timestamp on every tick.
///
/// Never talks to the ledger. Two runtimes fed the same `(start, now)` land on the same phase.
#[derive(Debug, Clone)]
pub struct PhaseRuntime {
    timing: RoundTiming,
    config: PhaseConfig,
    phase: QuizPhase,
    last_observed_round: Option<u32>,
    next_round_to_evaluate: u32,
}

impl PhaseRuntime {
    pub fn new(timing: RoundTiming, config: PhaseConfig) -> Result<Self, ContractViolation> {
        timing.validate()?;
        if config.feedback_window_ms >= timing.round_duration_ms {
            return Err(ContractViolation::InvalidValue {
                field: "phase_config.feedback_window_ms",
                reason: "must be shorter than round_duration_ms",
            });
        }
        Ok(Self {
            timing,
            config,
            phase: QuizPhase::Unstarted,
            last_observed_round: None,
            next_round_to_evaluate: 0,
        })
    }

    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    pub fn timing(&self) -> RoundTiming {
        self.timing
    }

    pub fn config(&self) -> PhaseConfig {
        self.config
    }

    /// Rounds whose accumulation has not been triggered yet start here.
    pub fn next_round_to_evaluate(&self) -> u32 {
        self.next_round_to_evaluate
    }

    pub fn step(&mut self, start: Option<WallClockMs>, now: WallClockMs) -> PhaseTick {
        let Some(start) = start else {
            return self.hold(None, false);
        };
        let reading = read_round_clock(start, now, self.timing);

        if self.phase.is_terminal() {
            return self.hold(Some(reading), false);
        }

        let target = self.derive_phase(&reading);
        if phase_rank(target) < phase_rank(self.phase) {
            return self.hold(Some(reading), true);
        }

        let round_entered = match target.round_index() {
            Some(r) if self.last_observed_round != Some(r) => {
                self.last_observed_round = Some(r);
                Some(r)
            }
            _ => None,
        };

        let evaluate_through = match target {
            QuizPhase::Unstarted => None,
            QuizPhase::Question { round_index } => round_index.checked_sub(1),
            QuizPhase::Feedback { round_index } => Some(round_index),
            QuizPhase::Leaderboard => self.timing.round_count.checked_sub(1),
        };
        let mut rounds_to_evaluate = Vec::new();
        if let Some(through) = evaluate_through {
            while self.next_round_to_evaluate <= through {
                rounds_to_evaluate.push(self.next_round_to_evaluate);
                self.next_round_to_evaluate += 1;
            }
        }

        let transition = if target != self.phase {
            PhaseTransition::v1(self.phase, target, transition_reason(target), now).ok()
        } else {
            None
        };
        self.phase = target;

        PhaseTick {
            phase: target,
            reading: Some(reading),
            transition,
            round_entered,
            rounds_to_evaluate,
            stale_clock: false,
        }
    }

    /// Phase the clock points at for `now`, without advancing the runtime.
    pub fn phase_at(&self, start: WallClockMs, now: WallClockMs) -> QuizPhase {
        self.derive_phase(&read_round_clock(start, now, self.timing))
    }

    fn derive_phase(&self, reading: &RoundClockReading) -> QuizPhase {
        if reading.terminal {
            QuizPhase::Leaderboard
        } else if reading.remaining_ms <= self.config.feedback_window_ms {
            QuizPhase::Feedback {
                round_index: reading.round_index,
            }
        } else {
            QuizPhase::Question {
                round_index: reading.round_index,
            }
        }
    }

    fn hold(&self, reading: Option<RoundClockReading>, stale_clock: bool) -> PhaseTick {
        PhaseTick {
            phase: self.phase,
            reading,
            transition: None,
            round_entered: None,
            rounds_to_evaluate: Vec::new(),
            stale_clock,
        }
    }
}

fn phase_rank(phase: QuizPhase) -> u64 {
    match phase {
        QuizPhase::Unstarted => 0,
        QuizPhase::Question { round_index } => 1 + 2 * u64::from(round_index),
        QuizPhase::Feedback { round_index } => 2 + 2 * u64::from(round_index),
        QuizPhase::Leaderboard => u64::MAX,
    }
}

fn transition_reason(to: QuizPhase) -> quizsync_kernel_contracts::ReasonCodeId {
    match to {
        QuizPhase::Feedback { .. } => reason_codes::PHASE_FEEDBACK_OPEN,
        QuizPhase::Leaderboard => reason_codes::PHASE_LEADERBOARD_TERMINAL,
        QuizPhase::Question { .. } | QuizPhase::Unstarted => reason_codes::PHASE_QUESTION_OPEN,
    }
}
