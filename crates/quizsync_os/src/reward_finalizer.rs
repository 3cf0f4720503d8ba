#![forbid(unsafe_code)]

use std::time::Duration;

use quizsync_kernel_contracts::session::{PlayerId, PlayerRole, SessionId};
use quizsync_kernel_contracts::standing::StandingSnapshot;
use tracing::{info, warn};

use crate::ledger_client::{bounded, LedgerClient, LedgerError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FinalizeError {
    #[error("only the session host may finalize")]
    NotHost,
    #[error("no standing with at least one player to pick winners from")]
    NoStanding,
    #[error("winner count must be at least 1")]
    InvalidWinnerCount,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Top `winner_count` players of the standing, clamped to its length.
pub fn select_winners(
    standing: &StandingSnapshot,
    winner_count: usize,
) -> Result<Vec<PlayerId>, FinalizeError> {
    if winner_count == 0 {
        return Err(FinalizeError::InvalidWinnerCount);
    }
    if standing.entries.is_empty() {
        return Err(FinalizeError::NoStanding);
    }
    Ok(standing
        .top(winner_count)
        .iter()
        .map(|e| e.player_id.clone())
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeTicket {
    pub session_id: SessionId,
    pub caller: PlayerId,
    pub winners: Vec<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeStatus {
    Idle,
    InFlight,
    Finalized { winners: Vec<PlayerId> },
    Failed { reason: String },
}

/// Host-side finalization. Nothing here prevents a second attempt; the ledger does.
#[derive(Debug, Clone)]
pub struct RewardFinalizer {
    session_id: SessionId,
    local: PlayerId,
    role: PlayerRole,
    status: FinalizeStatus,
}

impl RewardFinalizer {
    pub fn new(session_id: SessionId, local: PlayerId, role: PlayerRole) -> Self {
        Self {
            session_id,
            local,
            role,
            status: FinalizeStatus::Idle,
        }
    }

    pub fn prepare(
        &mut self,
        standing: Option<&StandingSnapshot>,
        winner_count: usize,
    ) -> Result<FinalizeTicket, FinalizeError> {
        if self.role != PlayerRole::Host {
            return Err(FinalizeError::NotHost);
        }
        let standing = standing.ok_or(FinalizeError::NoStanding)?;
        let winners = select_winners(standing, winner_count)?;
        self.status = FinalizeStatus::InFlight;
        Ok(FinalizeTicket {
            session_id: self.session_id.clone(),
            caller: self.local.clone(),
            winners,
        })
    }

    pub fn record(&mut self, ticket: &FinalizeTicket, result: &Result<(), LedgerError>) {
        self.status = match result {
            Ok(()) => FinalizeStatus::Finalized {
                winners: ticket.winners.clone(),
            },
            Err(e) => FinalizeStatus::Failed {
                reason: e.to_string(),
            },
        };
    }

    pub async fn finalize(
        &mut self,
        ledger: &dyn LedgerClient,
        standing: Option<&StandingSnapshot>,
        winner_count: usize,
        timeout: Duration,
    ) -> Result<Vec<PlayerId>, FinalizeError> {
        let ticket = self.prepare(standing, winner_count)?;
        let result = dispatch_finalize(ledger, &ticket, timeout).await;
        self.record(&ticket, &result);
        result?;
        Ok(ticket.winners)
    }

    pub fn status(&self) -> &FinalizeStatus {
        &self.status
    }
}

pub async fn dispatch_finalize(
    ledger: &dyn LedgerClient,
    ticket: &FinalizeTicket,
    timeout: Duration,
) -> Result<(), LedgerError> {
    let result = bounded(
        "write_finalize",
        timeout,
        ledger.write_finalize(&ticket.session_id, &ticket.caller, &ticket.winners),
    )
    .await;
    match &result {
        Ok(()) => info!(
            session_id = %ticket.session_id,
            winners = ticket.winners.len(),
            "session finalized"
        ),
        Err(e) => warn!(session_id = %ticket.session_id, error = %e, "finalize failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use quizsync_kernel_contracts::session::RoundTiming;
    use quizsync_kernel_contracts::WallClockMs;

    use super::*;
    use crate::leaderboard::fetch_standing;
    use crate::ledger_client::test_support::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn at_finalize_01_host_finalizes_top_scorer() {
        let clock = TestClock::at(1_000);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa", "0xb", "0xc"]).await;
        ledger.write_submit_score(&sid, &pid("0xa"), 300).await.unwrap();
        ledger.write_submit_score(&sid, &pid("0xc"), 900).await.unwrap();
        let standing = fetch_standing(&ledger, &sid, RoundTiming::mvp_v1(), TIMEOUT, WallClockMs(2))
            .await
            .unwrap()
            .snapshot;

        let mut f = RewardFinalizer::new(sid.clone(), pid("0xhost"), PlayerRole::Host);
        let winners = f
            .finalize(&ledger, Some(&standing), 2, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(winners, vec![pid("0xc"), pid("0xa")]);
        assert_eq!(
            f.status(),
            &FinalizeStatus::Finalized {
                winners: vec![pid("0xc"), pid("0xa")]
            }
        );
        let rec = ledger.read_session(&sid).await.unwrap();
        assert_eq!(rec.state, Some(2));
        assert_eq!(rec.winners, vec!["0xc".to_string(), "0xa".to_string()]);
    }

    #[tokio::test]
    async fn at_finalize_02_second_finalize_rejected_by_ledger() {
        let clock = TestClock::at(1_000);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa"]).await;
        let standing = fetch_standing(&ledger, &sid, RoundTiming::mvp_v1(), TIMEOUT, WallClockMs(2))
            .await
            .unwrap()
            .snapshot;
        let mut f = RewardFinalizer::new(sid, pid("0xhost"), PlayerRole::Host);
        f.finalize(&ledger, Some(&standing), 1, TIMEOUT)
            .await
            .unwrap();
        let again = f.finalize(&ledger, Some(&standing), 1, TIMEOUT).await;
        assert!(matches!(
            again,
            Err(FinalizeError::Ledger(LedgerError::Rejected { .. }))
        ));
        assert!(matches!(f.status(), FinalizeStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn at_finalize_03_non_host_and_bad_counts_rejected_locally() {
        let clock = TestClock::at(1_000);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa", "0xb"]).await;
        let standing = fetch_standing(&ledger, &sid, RoundTiming::mvp_v1(), TIMEOUT, WallClockMs(2))
            .await
            .unwrap()
            .snapshot;

        let mut player = RewardFinalizer::new(sid.clone(), pid("0xa"), PlayerRole::Player);
        assert_eq!(
            player.prepare(Some(&standing), 1),
            Err(FinalizeError::NotHost)
        );

        let mut host = RewardFinalizer::new(sid, pid("0xhost"), PlayerRole::Host);
        assert_eq!(
            host.prepare(Some(&standing), 0),
            Err(FinalizeError::InvalidWinnerCount)
        );
        assert_eq!(host.prepare(None, 1), Err(FinalizeError::NoStanding));
        assert_eq!(host.status(), &FinalizeStatus::Idle);
    }

    #[tokio::test]
    async fn at_finalize_04_winner_count_clamped_to_standing() {
        let clock = TestClock::at(1_000);
        let ledger = ledger_at(&clock);
        let sid = started_session(&ledger, &["0xa", "0xb"]).await;
        let standing = fetch_standing(&ledger, &sid, RoundTiming::mvp_v1(), TIMEOUT, WallClockMs(2))
            .await
            .unwrap()
            .snapshot;
        assert_eq!(
            select_winners(&standing, 10).unwrap(),
            vec![pid("0xa"), pid("0xb")]
        );
    }
}
