#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use quizsync_engines::round_clock::round_start_at;
use quizsync_engines::score_fn::ScoreFormula;
use quizsync_kernel_contracts::answer::{PlayerAnswer, RoundVerdict};
use quizsync_kernel_contracts::question::QuestionCard;
use quizsync_kernel_contracts::round::QuizPhase;
use quizsync_kernel_contracts::session::{PlayerId, PlayerRole, RoundTiming};
use quizsync_kernel_contracts::{ContractViolation, Validate, WallClockMs};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Captured(PlayerAnswer),
    IgnoredAlreadyLocked { round_index: u32 },
    IgnoredHost,
    IgnoredPhaseClosed,
    IgnoredInvalidChoice,
}

/// Locks one answer per round at click time and accumulates correct answers once per round.
#[derive(Debug, Clone)]
pub struct ScoreCaptureRuntime {
    player_id: PlayerId,
    role: PlayerRole,
    formula: ScoreFormula,
    current_round: Option<u32>,
    answers: BTreeMap<u32, PlayerAnswer>,
    verdicts: BTreeMap<u32, RoundVerdict>,
    cumulative_score: u64,
}

impl ScoreCaptureRuntime {
    pub fn new(
        player_id: PlayerId,
        role: PlayerRole,
        formula: ScoreFormula,
    ) -> Result<Self, ContractViolation> {
        formula.validate()?;
        Ok(Self {
            player_id,
            role,
            formula,
            current_round: None,
            answers: BTreeMap::new(),
            verdicts: BTreeMap::new(),
            cumulative_score: 0,
        })
    }

    /// Marks the round now open for selection. Locks are kept per round index.
    pub fn on_round_entered(&mut self, round_index: u32) {
        self.current_round = Some(round_index);
        debug!(player_id = %self.player_id, round_index, "selection opened");
    }

    pub fn select(
        &mut self,
        choice_index: u8,
        phase: QuizPhase,
        now: WallClockMs,
        start: WallClockMs,
        timing: RoundTiming,
        card: &QuestionCard,
    ) -> Result<SelectOutcome, ContractViolation> {
        if self.role == PlayerRole::Host {
            debug!(player_id = %self.player_id, "selection ignored: host spectates");
            return Ok(SelectOutcome::IgnoredHost);
        }
        let QuizPhase::Question { round_index } = phase else {
            debug!(player_id = %self.player_id, ?phase, "selection ignored: phase closed");
            return Ok(SelectOutcome::IgnoredPhaseClosed);
        };
        if self.answers.contains_key(&round_index) {
            debug!(player_id = %self.player_id, round_index, "selection ignored: already locked");
            return Ok(SelectOutcome::IgnoredAlreadyLocked { round_index });
        }
        if !card.has_choice(choice_index) {
            debug!(player_id = %self.player_id, choice_index, "selection ignored: no such option");
            return Ok(SelectOutcome::IgnoredInvalidChoice);
        }

        let round_start = round_start_at(start, timing, round_index);
        let time_taken_ms = now.saturating_since(round_start);
        let locked_score = self.formula.score_for_time_taken(time_taken_ms);
        let answer = PlayerAnswer::v1(
            self.player_id.clone(),
            round_index,
            choice_index,
            now,
            time_taken_ms,
            locked_score,
        )?;
        self.answers.insert(round_index, answer.clone());
        debug!(
            player_id = %self.player_id,
            round_index,
            choice_index,
            time_taken_ms,
            locked_score,
            "answer locked"
        );
        Ok(SelectOutcome::Captured(answer))
    }

    /// Scores a round against its correct choice. A second call for the same round returns the
    /// first verdict and adds nothing.
    pub fn accumulate_round(&mut self, round_index: u32, correct_choice: u8) -> RoundVerdict {
        if let Some(v) = self.verdicts.get(&round_index) {
            return *v;
        }
        let verdict = match self.answers.get(&round_index) {
            None => RoundVerdict::unanswered(round_index),
            Some(a) => {
                let correct = a.choice_index == correct_choice;
                RoundVerdict {
                    round_index,
                    answered: true,
                    correct,
                    awarded: if correct { a.locked_score } else { 0 },
                }
            }
        };
        self.cumulative_score = self
            .cumulative_score
            .saturating_add(u64::from(verdict.awarded));
        self.verdicts.insert(round_index, verdict);
        verdict
    }

    pub fn cumulative_score(&self) -> u64 {
        self.cumulative_score
    }

    pub fn answer_for(&self, round_index: u32) -> Option<&PlayerAnswer> {
        self.answers.get(&round_index)
    }

    pub fn verdict_for(&self, round_index: u32) -> Option<RoundVerdict> {
        self.verdicts.get(&round_index).copied()
    }

    pub fn current_round(&self) -> Option<u32> {
        self.current_round
    }

    pub fn role(&self) -> PlayerRole {
        self.role
    }
}
