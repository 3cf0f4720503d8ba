#![forbid(unsafe_code)]

use quizsync_kernel_contracts::{ContractViolation, Validate};

/// Time-decayed point value of a single answer.
///
/// `score = base + max(0, max_bonus - floor(t / 1000) * decay_per_sec)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScoreFormula {
    pub base: u32,
    pub max_bonus: u32,
    pub decay_per_sec: u32,
}

impl ScoreFormula {
    pub fn mvp_v1() -> Self {
        Self {
            base: 150,
            max_bonus: 600,
            decay_per_sec: 30,
        }
    }

    pub fn bonus_for_time_taken(&self, time_taken_ms: u64) -> u32 {
        let whole_secs = time_taken_ms / 1_000;
        let decay = whole_secs.saturating_mul(u64::from(self.decay_per_sec));
        u64::from(self.max_bonus).saturating_sub(decay) as u32
    }

    pub fn score_for_time_taken(&self, time_taken_ms: u64) -> u32 {
        self.base.saturating_add(self.bonus_for_time_taken(time_taken_ms))
    }

    /// First `time_taken_ms` at which the score sits at `base`.
    pub fn floor_reached_at_ms(&self) -> u64 {
        if self.decay_per_sec == 0 {
            return u64::MAX;
        }
        let secs = u64::from(self.max_bonus).div_ceil(u64::from(self.decay_per_sec));
        secs.saturating_mul(1_000)
    }

    pub fn max_score(&self) -> u32 {
        self.base.saturating_add(self.max_bonus)
    }
}

impl Validate for ScoreFormula {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.base == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "score_formula.base",
                reason: "must be > 0",
            });
        }
        if self.max_bonus > 0 && self.decay_per_sec == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "score_formula.decay_per_sec",
                reason: "must be > 0 when max_bonus > 0",
            });
        }
        Ok(())
    }
}
