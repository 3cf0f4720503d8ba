#![forbid(unsafe_code)]

use std::time::Duration;

use quizsync_kernel_contracts::round::QuizPhase;
use quizsync_kernel_contracts::session::{PlayerId, PlayerRole, SessionId};
use tracing::{info, warn};

use crate::ledger_client::{bounded, LedgerClient, LedgerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    Idle,
    InFlight,
    Succeeded,
    Failed { reason: String },
    /// Host identity; never submits.
    NotApplicable,
}

/// The one score write this client will ever issue for its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTicket {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDecision {
    Dispatch(SubmitTicket),
    SkipHost,
    SkipNotTerminal,
    SkipAlreadyArmed,
}

/// Guards the single final-score write.
///
/// The guard flag is set synchronously in `arm`, before any write is awaited, and is never
/// cleared. A failed write is reported and not retried.
#[derive(Debug, Clone)]
pub struct ScoreSubmitter {
    session_id: SessionId,
    player_id: PlayerId,
    role: PlayerRole,
    armed: bool,
    status: SubmissionStatus,
}

impl ScoreSubmitter {
    pub fn new(session_id: SessionId, player_id: PlayerId, role: PlayerRole) -> Self {
        let status = match role {
            PlayerRole::Host => SubmissionStatus::NotApplicable,
            PlayerRole::Player => SubmissionStatus::Idle,
        };
        Self {
            session_id,
            player_id,
            role,
            armed: false,
            status,
        }
    }

    pub fn arm(&mut self, phase: QuizPhase, cumulative_score: u64) -> SubmitDecision {
        if self.role == PlayerRole::Host {
            return SubmitDecision::SkipHost;
        }
        if !phase.is_terminal() {
            return SubmitDecision::SkipNotTerminal;
        }
        if self.armed {
            return SubmitDecision::SkipAlreadyArmed;
        }
        self.armed = true;
        self.status = SubmissionStatus::InFlight;
        SubmitDecision::Dispatch(SubmitTicket {
            session_id: self.session_id.clone(),
            player_id: self.player_id.clone(),
            score: cumulative_score,
        })
    }

    pub fn record_result(&mut self, result: &Result<(), LedgerError>) {
        self.status = match result {
            Ok(()) => SubmissionStatus::Succeeded,
            Err(e) => SubmissionStatus::Failed {
                reason: e.to_string(),
            },
        };
    }

    /// Arms and performs the write in one call. `None` when nothing was dispatched.
    pub async fn submit_final(
        &mut self,
        ledger: &dyn LedgerClient,
        phase: QuizPhase,
        cumulative_score: u64,
        timeout: Duration,
    ) -> Option<Result<(), LedgerError>> {
        let SubmitDecision::Dispatch(ticket) = self.arm(phase, cumulative_score) else {
            return None;
        };
        let result = dispatch_submission(ledger, &ticket, timeout).await;
        self.record_result(&result);
        Some(result)
    }

    pub fn status(&self) -> &SubmissionStatus {
        &self.status
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

pub async fn dispatch_submission(
    ledger: &dyn LedgerClient,
    ticket: &SubmitTicket,
    timeout: Duration,
) -> Result<(), LedgerError> {
    let result = bounded(
        "write_submit_score",
        timeout,
        ledger.write_submit_score(&ticket.session_id, &ticket.player_id, ticket.score),
    )
    .await;
    match &result {
        Ok(()) => info!(
            session_id = %ticket.session_id,
            player_id = %ticket.player_id,
            score = ticket.score,
            "final score submitted"
        ),
        Err(e) => warn!(
            session_id = %ticket.session_id,
            player_id = %ticket.player_id,
            error = %e,
            "final score submission failed"
        ),
    }
    result
}
