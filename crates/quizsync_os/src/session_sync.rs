#![forbid(unsafe_code)]

use std::time::Duration;

use quizsync_kernel_contracts::ledger::LedgerSessionRecord;
use quizsync_kernel_contracts::session::{
    PlayerId, PlayerRole, RoundTiming, ScoreTableId, Session, SessionId, SessionLifecycle,
    MAX_PLAYERS_PER_SESSION,
};
use quizsync_kernel_contracts::WallClockMs;
use tracing::warn;

use crate::ledger_client::{bounded, LedgerClient, LedgerError};
use crate::notice::ClientNotice;

pub mod reason_codes {
    use quizsync_kernel_contracts::ReasonCodeId;

    // Session sync reason-code namespace.
    pub const SYNC_PLAYERS_MISSING: ReasonCodeId = ReasonCodeId(0x5152_0001);
    pub const SYNC_PLAYER_ID_INVALID: ReasonCodeId = ReasonCodeId(0x5152_0002);
    pub const SYNC_STATE_UNKNOWN: ReasonCodeId = ReasonCodeId(0x5152_0003);
    pub const SYNC_TIMING_INVALID: ReasonCodeId = ReasonCodeId(0x5152_0004);
    pub const SYNC_START_MISSING: ReasonCodeId = ReasonCodeId(0x5152_0005);
    pub const SYNC_START_UNEXPECTED: ReasonCodeId = ReasonCodeId(0x5152_0006);
    pub const SYNC_SCORE_TABLE_MISSING: ReasonCodeId = ReasonCodeId(0x5152_0007);
    pub const SYNC_PLAYERS_TRUNCATED: ReasonCodeId = ReasonCodeId(0x5152_0008);
}

/// Session decoded from a ledger record plus one notice per field that had to be degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub session: Session,
    pub notices: Vec<ClientNotice>,
}

impl SessionView {
    /// Maps a wire record into the session model.
    ///
    /// Only a missing or invalid session id or host id fails the whole record; every other
    /// field degrades to a default.
    pub fn from_record(
        record: &LedgerSessionRecord,
        fallback_timing: RoundTiming,
    ) -> Result<Self, LedgerError> {
        let session_id =
            SessionId::new(record.session_id.clone()).map_err(|v| LedgerError::MalformedData {
                reason: format!("session_id: {v}"),
            })?;
        let host_id = record
            .host_id
            .as_deref()
            .ok_or_else(|| LedgerError::MalformedData {
                reason: "host_id missing".to_string(),
            })
            .and_then(|h| {
                PlayerId::new(h).map_err(|v| LedgerError::MalformedData {
                    reason: format!("host_id: {v}"),
                })
            })?;

        let mut notices = Vec::new();

        let mut players: Vec<PlayerId> = Vec::new();
        match &record.players {
            None => notices.push(ClientNotice::malformed(
                reason_codes::SYNC_PLAYERS_MISSING,
                "players missing; treated as empty",
            )),
            Some(raw) => {
                for p in raw {
                    match PlayerId::new(p.as_str()) {
                        Ok(id) if id == host_id || players.contains(&id) => {
                            notices.push(ClientNotice::malformed(
                                reason_codes::SYNC_PLAYER_ID_INVALID,
                                format!("player {id} listed twice or as host; skipped"),
                            ));
                        }
                        Ok(id) => players.push(id),
                        Err(v) => notices.push(ClientNotice::malformed(
                            reason_codes::SYNC_PLAYER_ID_INVALID,
                            format!("player id rejected: {v}"),
                        )),
                    }
                }
            }
        }
        if players.len() > MAX_PLAYERS_PER_SESSION {
            players.truncate(MAX_PLAYERS_PER_SESSION);
            notices.push(ClientNotice::malformed(
                reason_codes::SYNC_PLAYERS_TRUNCATED,
                "player list longer than allowed; truncated",
            ));
        }

        let mut lifecycle = match record.state.map(SessionLifecycle::from_code) {
            Some(Some(l)) => l,
            _ => {
                notices.push(ClientNotice::malformed(
                    reason_codes::SYNC_STATE_UNKNOWN,
                    format!("state {:?} not recognised; treated as waiting", record.state),
                ));
                SessionLifecycle::Waiting
            }
        };

        let timing = match (record.round_duration_ms, record.round_count) {
            (Some(d), Some(c)) => match RoundTiming::v1(d, c) {
                Ok(t) => t,
                Err(v) => {
                    notices.push(ClientNotice::malformed(
                        reason_codes::SYNC_TIMING_INVALID,
                        format!("round timing rejected: {v}"),
                    ));
                    fallback_timing
                }
            },
            _ => {
                notices.push(ClientNotice::malformed(
                    reason_codes::SYNC_TIMING_INVALID,
                    "round timing missing; using local default",
                ));
                fallback_timing
            }
        };

        let mut start_timestamp_ms = record.start_timestamp_ms.map(WallClockMs);
        match (lifecycle, start_timestamp_ms) {
            (SessionLifecycle::Active, None) => {
                notices.push(ClientNotice::malformed(
                    reason_codes::SYNC_START_MISSING,
                    "active session without start timestamp; treated as waiting",
                ));
                lifecycle = SessionLifecycle::Waiting;
            }
            (SessionLifecycle::Waiting, Some(_)) => {
                notices.push(ClientNotice::malformed(
                    reason_codes::SYNC_START_UNEXPECTED,
                    "waiting session carries a start timestamp; ignored",
                ));
                start_timestamp_ms = None;
            }
            _ => {}
        }

        let score_table_id = match record
            .score_table_id
            .as_deref()
            .map(ScoreTableId::new)
        {
            Some(Ok(t)) => t,
            _ => {
                notices.push(ClientNotice::malformed(
                    reason_codes::SYNC_SCORE_TABLE_MISSING,
                    "score table id missing or invalid; derived from session id",
                ));
                session_id.score_table_id()
            }
        };

        let session = Session::v1(
            session_id,
            host_id,
            players,
            lifecycle,
            start_timestamp_ms,
            timing,
            score_table_id,
        )
        .map_err(|v| LedgerError::MalformedData {
            reason: v.to_string(),
        })?;

        for n in &notices {
            warn!(
                session_id = %session.session_id,
                reason_code = n.reason_code.0,
                "{}",
                n.message
            );
        }
        Ok(Self { session, notices })
    }
}

/// Reads and decodes the session under the ledger timeout.
pub async fn fetch_session(
    ledger: &dyn LedgerClient,
    session_id: &SessionId,
    fallback_timing: RoundTiming,
    timeout: Duration,
) -> Result<SessionView, LedgerError> {
    let record = bounded("read_session", timeout, ledger.read_session(session_id)).await?;
    SessionView::from_record(&record, fallback_timing)
}

/// What the waiting room shows for the local identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyStatus {
    pub player_count: usize,
    pub is_host: bool,
    pub has_joined: bool,
    pub ready_to_enter: bool,
    pub lifecycle: SessionLifecycle,
}

impl LobbyStatus {
    pub fn observe(session: &Session, local: &PlayerId) -> Self {
        let is_host = session.role_of(local) == PlayerRole::Host;
        Self {
            player_count: session.players.len(),
            is_host,
            has_joined: session.has_player(local),
            ready_to_enter: session.lifecycle == SessionLifecycle::Active
                && session.start_timestamp_ms.is_some(),
            lifecycle: session.lifecycle,
        }
    }

    /// A non-host identity that has not joined may still join.
    pub fn can_join(&self) -> bool {
        !self.is_host && !self.has_joined && self.lifecycle == SessionLifecycle::Waiting
    }
}
