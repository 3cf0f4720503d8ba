#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quizsync_kernel_contracts::ledger::LedgerSessionRecord;
use quizsync_kernel_contracts::session::{PlayerId, RoundTiming, ScoreTableId, SessionId};
use quizsync_kernel_contracts::WallClockMs;
use quizsync_storage::ledger_store::{LedgerStore, StorageError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger object not found: {what}")]
    NotFound { what: String },
    #[error("ledger data malformed: {reason}")]
    MalformedData { reason: String },
    #[error("ledger request failed: {0}")]
    Network(String),
    #[error("ledger rejected the write: {reason}")]
    Rejected { reason: String },
    #[error("ledger {op} timed out after {after_ms}ms")]
    Timeout { op: &'static str, after_ms: u64 },
}

impl LedgerError {
    /// Transient failures the UI reports as a non-fatal notice.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Network(_) | LedgerError::Timeout { .. })
    }
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ForeignKeyViolation { table, key } if table == "sessions" => {
                LedgerError::NotFound {
                    what: format!("session {key}"),
                }
            }
            other => LedgerError::Rejected {
                reason: other.to_string(),
            },
        }
    }
}

/// Asynchronous view of the ledger service.
///
/// Reads may be stale. Writes are request/response and carry the caller identity that a signed
/// transaction would; nothing here retries.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn read_session(&self, session_id: &SessionId)
        -> Result<LedgerSessionRecord, LedgerError>;

    /// `NotFound` when the player has no entry yet.
    async fn read_score_entry(
        &self,
        table_id: &ScoreTableId,
        player_id: &PlayerId,
    ) -> Result<u64, LedgerError>;

    async fn write_submit_score(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
        score: u64,
    ) -> Result<(), LedgerError>;

    async fn write_finalize(
        &self,
        session_id: &SessionId,
        caller: &PlayerId,
        winners: &[PlayerId],
    ) -> Result<(), LedgerError>;

    async fn write_start_session(
        &self,
        session_id: &SessionId,
        caller: &PlayerId,
    ) -> Result<(), LedgerError>;

    async fn write_join_session(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> Result<(), LedgerError>;

    async fn write_create_session(
        &self,
        host_id: &PlayerId,
        timing: RoundTiming,
        reward_per_winner: u64,
    ) -> Result<SessionId, LedgerError>;

    async fn write_claim_reward(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> Result<u64, LedgerError>;
}

/// Runs one ledger operation under a deadline.
pub async fn bounded<T, F>(op: &'static str, timeout: Duration, fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout {
            op,
            after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

pub type LedgerClock = Arc<dyn Fn() -> WallClockMs + Send + Sync>;

/// `LedgerClient` over an in-process `LedgerStore`. Used by the offline demo and tests.
#[derive(Clone)]
pub struct InMemoryLedgerClient {
    store: Arc<Mutex<LedgerStore>>,
    clock: LedgerClock,
}

impl InMemoryLedgerClient {
    pub fn new(store: Arc<Mutex<LedgerStore>>, clock: LedgerClock) -> Self {
        Self { store, clock }
    }

    pub fn with_system_clock(store: Arc<Mutex<LedgerStore>>) -> Self {
        Self::new(store, Arc::new(crate::wall_clock_now))
    }

    pub fn store(&self) -> Arc<Mutex<LedgerStore>> {
        self.store.clone()
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&mut LedgerStore, WallClockMs) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let now = (self.clock)();
        let mut store = self
            .store
            .lock()
            .map_err(|_| LedgerError::Network("ledger store lock poisoned".to_string()))?;
        f(&mut store, now)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedgerClient {
    async fn read_session(
        &self,
        session_id: &SessionId,
    ) -> Result<LedgerSessionRecord, LedgerError> {
        self.with_store(|store, _| {
            store
                .get_session(session_id)
                .map(|row| row.to_wire())
                .ok_or_else(|| LedgerError::NotFound {
                    what: format!("session {session_id}"),
                })
        })
    }

    async fn read_score_entry(
        &self,
        table_id: &ScoreTableId,
        player_id: &PlayerId,
    ) -> Result<u64, LedgerError> {
        self.with_store(|store, _| {
            store
                .score_entry(table_id, player_id)
                .ok_or_else(|| LedgerError::NotFound {
                    what: format!("score entry {table_id}/{player_id}"),
                })
        })
    }

    async fn write_submit_score(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
        score: u64,
    ) -> Result<(), LedgerError> {
        self.with_store(|store, now| {
            Ok(store.submit_score(session_id, player_id.clone(), score, now)?)
        })
    }

    async fn write_finalize(
        &self,
        session_id: &SessionId,
        caller: &PlayerId,
        winners: &[PlayerId],
    ) -> Result<(), LedgerError> {
        self.with_store(|store, now| {
            Ok(store.finalize_session(session_id, caller, winners, now)?)
        })
    }

    async fn write_start_session(
        &self,
        session_id: &SessionId,
        caller: &PlayerId,
    ) -> Result<(), LedgerError> {
        self.with_store(|store, now| {
            store.start_session(session_id, caller, now)?;
            Ok(())
        })
    }

    async fn write_join_session(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> Result<(), LedgerError> {
        self.with_store(|store, now| Ok(store.join_session(session_id, player_id.clone(), now)?))
    }

    async fn write_create_session(
        &self,
        host_id: &PlayerId,
        timing: RoundTiming,
        reward_per_winner: u64,
    ) -> Result<SessionId, LedgerError> {
        self.with_store(|store, now| {
            Ok(store.create_session(host_id.clone(), timing, reward_per_winner, now)?)
        })
    }

    async fn write_claim_reward(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> Result<u64, LedgerError> {
        self.with_store(|store, now| Ok(store.claim_reward(session_id, player_id, now)?))
    }
}
