#![forbid(unsafe_code)]

use crate::session::PlayerId;
use crate::{ContractViolation, SchemaVersion, Validate, WallClockMs};

pub const STANDING_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// A row of the ledger score table. Written at most once per (session, player).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteScoreEntry {
    pub player_id: PlayerId,
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaderboardEntry {
    /// 1-based.
    pub rank: u32,
    pub player_id: PlayerId,
    pub score: u64,
    /// False when the score is the implicit 0 of a player with no ledger entry yet.
    pub submitted: bool,
}

/// Sorted standing from one poll. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandingSnapshot {
    pub schema_version: SchemaVersion,
    pub entries: Vec<LeaderboardEntry>,
    pub polled_at: WallClockMs,
    /// True when the ledger reported the session as finalized at poll time.
    pub session_finalized: bool,
}

impl StandingSnapshot {
    pub fn v1(
        entries: Vec<LeaderboardEntry>,
        polled_at: WallClockMs,
        session_finalized: bool,
    ) -> Result<Self, ContractViolation> {
        let s = Self {
            schema_version: STANDING_CONTRACT_VERSION,
            entries,
            polled_at,
            session_finalized,
        };
        s.validate()?;
        Ok(s)
    }

    pub fn top(&self, n: usize) -> &[LeaderboardEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn score_of(&self, player: &PlayerId) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.player_id == *player)
            .map(|e| e.score)
    }
}

impl Validate for StandingSnapshot {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != STANDING_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "standing_snapshot.schema_version",
                reason: "must match STANDING_CONTRACT_VERSION",
            });
        }
        for (i, e) in self.entries.iter().enumerate() {
            e.player_id.validate()?;
            if e.rank as usize != i + 1 {
                return Err(ContractViolation::InvalidValue {
                    field: "standing_snapshot.entries.rank",
                    reason: "must be 1-based position",
                });
            }
            if i > 0 && self.entries[i - 1].score < e.score {
                return Err(ContractViolation::InvalidValue {
                    field: "standing_snapshot.entries",
                    reason: "must be sorted by score descending",
                });
            }
        }
        Ok(())
    }
}
