#![forbid(unsafe_code)]

use std::env;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use quizsync_kernel_contracts::ledger::LedgerSessionRecord;
use quizsync_kernel_contracts::round::QuizPhase;
use quizsync_kernel_contracts::session::{PlayerId, RoundTiming, ScoreTableId, SessionId};
use quizsync_kernel_contracts::{ContractViolation, WallClockMs};
use quizsync_os::leaderboard::fetch_standing;
use quizsync_os::ledger_client::{LedgerClient, LedgerClock, LedgerError};
use quizsync_os::quiz_client::{ClientConfig, ClientTick, QuizClient};
use quizsync_os::score_submitter::dispatch_submission;
use quizsync_os::session_sync::fetch_session;
use quizsync_os::wall_clock_now;
use quizsync_storage::ledger_store::{LedgerStore, StorageError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_LEDGER_BIND: &str = "127.0.0.1:8088";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub host_id: String,
    pub round_duration_ms: u64,
    pub round_count: u32,
    #[serde(default)]
    pub reward_per_winner: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSessionRequest {
    pub player_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub caller: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub start_timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitScoreRequest {
    pub player_id: String,
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeSessionRequest {
    pub caller: String,
    pub winners: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRewardRequest {
    pub player_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRewardResponse {
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntryResponse {
    pub player_id: String,
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
}

type ApiFailure = (StatusCode, Json<ApiErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiFailure>;

fn api_error(status: StatusCode, outcome: &str, reason: impl Into<String>) -> ApiFailure {
    (
        status,
        Json(ApiErrorBody {
            status: "error".to_string(),
            outcome: outcome.to_string(),
            reason: Some(reason.into()),
        }),
    )
}

fn ack() -> Json<AckResponse> {
    Json(AckResponse {
        status: "ok".to_string(),
    })
}

/// HTTP status and outcome label for a ledger guard rejection.
pub fn status_for_storage_error(err: &StorageError) -> (StatusCode, &'static str) {
    match err {
        StorageError::ForeignKeyViolation { table, .. } if *table == "sessions" => {
            (StatusCode::NOT_FOUND, "NOT_FOUND")
        }
        StorageError::ForeignKeyViolation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "REJECTED"),
        StorageError::DuplicateKey { .. } | StorageError::InvalidState { .. } => {
            (StatusCode::CONFLICT, "REJECTED")
        }
        StorageError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "REJECTED"),
        StorageError::ContractViolation(_) => (StatusCode::BAD_REQUEST, "MALFORMED"),
    }
}

fn storage_failure(err: StorageError) -> ApiFailure {
    let (status, outcome) = status_for_storage_error(&err);
    debug!(%err, status = status.as_u16(), "ledger write rejected");
    api_error(status, outcome, err.to_string())
}

fn malformed(field: &str, v: ContractViolation) -> ApiFailure {
    api_error(StatusCode::BAD_REQUEST, "MALFORMED", format!("{field}: {v}"))
}

fn parse_session_id(raw: String) -> Result<SessionId, ApiFailure> {
    SessionId::new(raw).map_err(|v| malformed("session_id", v))
}

fn parse_player_id(field: &str, raw: String) -> Result<PlayerId, ApiFailure> {
    PlayerId::new(raw).map_err(|v| malformed(field, v))
}

/// Shared state of the reference ledger service.
#[derive(Clone)]
pub struct LedgerHttpState {
    store: Arc<Mutex<LedgerStore>>,
    clock: LedgerClock,
}

impl LedgerHttpState {
    pub fn new(store: Arc<Mutex<LedgerStore>>, clock: LedgerClock) -> Self {
        Self { store, clock }
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&mut LedgerStore, WallClockMs) -> Result<T, ApiFailure>,
    ) -> Result<T, ApiFailure> {
        let now = (self.clock)();
        let mut store = self.store.lock().map_err(|_| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "UNHEALTHY",
                "ledger store lock poisoned",
            )
        })?;
        f(&mut store, now)
    }
}

pub fn ledger_router(state: LedgerHttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:session_id", get(read_session))
        .route("/v1/sessions/:session_id/join", post(join_session))
        .route("/v1/sessions/:session_id/start", post(start_session))
        .route("/v1/sessions/:session_id/scores", post(submit_score))
        .route("/v1/sessions/:session_id/finalize", post(finalize_session))
        .route("/v1/sessions/:session_id/claim", post(claim_reward))
        .route(
            "/v1/score_tables/:table_id/:player_id",
            get(read_score_entry),
        )
        .with_state(state)
}

async fn healthz(State(state): State<LedgerHttpState>) -> ApiResult<AckResponse> {
    state.with_store(|_, _| Ok(ack()))
}

async fn create_session(
    State(state): State<LedgerHttpState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<CreateSessionResponse> {
    let host_id = parse_player_id("host_id", req.host_id)?;
    let timing = RoundTiming::v1(req.round_duration_ms, req.round_count)
        .map_err(|v| malformed("round_timing", v))?;
    state.with_store(|store, now| {
        let session_id = store
            .create_session(host_id, timing, req.reward_per_winner, now)
            .map_err(storage_failure)?;
        info!(session_id = %session_id, "session created");
        Ok(Json(CreateSessionResponse {
            session_id: session_id.as_str().to_string(),
        }))
    })
}

async fn read_session(
    State(state): State<LedgerHttpState>,
    Path(session_id): Path<String>,
) -> ApiResult<LedgerSessionRecord> {
    let session_id = parse_session_id(session_id)?;
    state.with_store(|store, _| {
        store
            .get_session(&session_id)
            .map(|row| Json(row.to_wire()))
            .ok_or_else(|| {
                api_error(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("session {session_id}"),
                )
            })
    })
}

async fn join_session(
    State(state): State<LedgerHttpState>,
    Path(session_id): Path<String>,
    Json(req): Json<JoinSessionRequest>,
) -> ApiResult<AckResponse> {
    let session_id = parse_session_id(session_id)?;
    let player_id = parse_player_id("player_id", req.player_id)?;
    state.with_store(|store, now| {
        store
            .join_session(&session_id, player_id, now)
            .map_err(storage_failure)?;
        Ok(ack())
    })
}

async fn start_session(
    State(state): State<LedgerHttpState>,
    Path(session_id): Path<String>,
    Json(req): Json<StartSessionRequest>,
) -> ApiResult<StartSessionResponse> {
    let session_id = parse_session_id(session_id)?;
    let caller = parse_player_id("caller", req.caller)?;
    state.with_store(|store, now| {
        let started = store
            .start_session(&session_id, &caller, now)
            .map_err(storage_failure)?;
        info!(session_id = %session_id, start = started.0, "session started");
        Ok(Json(StartSessionResponse {
            start_timestamp_ms: started.0,
        }))
    })
}

async fn submit_score(
    State(state): State<LedgerHttpState>,
    Path(session_id): Path<String>,
    Json(req): Json<SubmitScoreRequest>,
) -> ApiResult<AckResponse> {
    let session_id = parse_session_id(session_id)?;
    let player_id = parse_player_id("player_id", req.player_id)?;
    state.with_store(|store, now| {
        store
            .submit_score(&session_id, player_id, req.score, now)
            .map_err(storage_failure)?;
        Ok(ack())
    })
}

async fn finalize_session(
    State(state): State<LedgerHttpState>,
    Path(session_id): Path<String>,
    Json(req): Json<FinalizeSessionRequest>,
) -> ApiResult<AckResponse> {
    let session_id = parse_session_id(session_id)?;
    let caller = parse_player_id("caller", req.caller)?;
    let winners = req
        .winners
        .into_iter()
        .map(|w| parse_player_id("winners", w))
        .collect::<Result<Vec<_>, _>>()?;
    state.with_store(|store, now| {
        store
            .finalize_session(&session_id, &caller, &winners, now)
            .map_err(storage_failure)?;
        info!(session_id = %session_id, winners = winners.len(), "session finalized");
        Ok(ack())
    })
}

async fn claim_reward(
    State(state): State<LedgerHttpState>,
    Path(session_id): Path<String>,
    Json(req): Json<ClaimRewardRequest>,
) -> ApiResult<ClaimRewardResponse> {
    let session_id = parse_session_id(session_id)?;
    let player_id = parse_player_id("player_id", req.player_id)?;
    state.with_store(|store, now| {
        let amount = store
            .claim_reward(&session_id, &player_id, now)
            .map_err(storage_failure)?;
        Ok(Json(ClaimRewardResponse { amount }))
    })
}

async fn read_score_entry(
    State(state): State<LedgerHttpState>,
    Path((table_id, player_id)): Path<(String, String)>,
) -> ApiResult<ScoreEntryResponse> {
    let table_id = ScoreTableId::new(table_id).map_err(|v| malformed("table_id", v))?;
    let player_id = parse_player_id("player_id", player_id)?;
    state.with_store(|store, _| {
        store
            .score_entry(&table_id, &player_id)
            .map(|score| {
                Json(ScoreEntryResponse {
                    player_id: player_id.as_str().to_string(),
                    score,
                })
            })
            .ok_or_else(|| {
                api_error(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("score entry {table_id}/{player_id}"),
                )
            })
    })
}

/// Maps an HTTP status from the ledger service back onto the client error classes.
pub fn ledger_error_from_status(code: u16, reason: String) -> LedgerError {
    match code {
        404 => LedgerError::NotFound { what: reason },
        400 | 403 | 409 | 422 => LedgerError::Rejected { reason },
        _ => LedgerError::Network(format!("http {code}: {reason}")),
    }
}

fn ledger_error_from_ureq(err: ureq::Error) -> LedgerError {
    match err {
        ureq::Error::Status(code, response) => {
            let reason = response
                .into_json::<ApiErrorBody>()
                .ok()
                .and_then(|b| b.reason)
                .unwrap_or_else(|| format!("http {code}"));
            ledger_error_from_status(code, reason)
        }
        ureq::Error::Transport(transport) => LedgerError::Network(transport.to_string()),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, LedgerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LedgerError::Network(format!("ledger request task failed: {e}")))?
}

/// `LedgerClient` over the ledger HTTP binding. Requests run on the blocking pool.
#[derive(Clone)]
pub struct HttpLedgerClient {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpLedgerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent("quizsync-player/0.1")
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T>(&self, path: String) -> Result<T, LedgerError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = format!("{}{}", self.base_url, path);
        run_blocking(move || {
            let response = agent
                .get(&url)
                .set("Accept", "application/json")
                .call()
                .map_err(ledger_error_from_ureq)?;
            response
                .into_json::<T>()
                .map_err(|e| LedgerError::MalformedData {
                    reason: e.to_string(),
                })
        })
        .await
    }

    async fn post_json<B, T>(&self, path: String, body: B) -> Result<T, LedgerError>
    where
        B: Serialize + Send + 'static,
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = format!("{}{}", self.base_url, path);
        run_blocking(move || {
            let response = agent
                .post(&url)
                .set("Accept", "application/json")
                .send_json(body)
                .map_err(ledger_error_from_ureq)?;
            response
                .into_json::<T>()
                .map_err(|e| LedgerError::MalformedData {
                    reason: e.to_string(),
                })
        })
        .await
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn read_session(
        &self,
        session_id: &SessionId,
    ) -> Result<LedgerSessionRecord, LedgerError> {
        self.get_json(format!("/v1/sessions/{session_id}")).await
    }

    async fn read_score_entry(
        &self,
        table_id: &ScoreTableId,
        player_id: &PlayerId,
    ) -> Result<u64, LedgerError> {
        let entry: ScoreEntryResponse = self
            .get_json(format!("/v1/score_tables/{table_id}/{player_id}"))
            .await?;
        Ok(entry.score)
    }

    async fn write_submit_score(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
        score: u64,
    ) -> Result<(), LedgerError> {
        let _: AckResponse = self
            .post_json(
                format!("/v1/sessions/{session_id}/scores"),
                SubmitScoreRequest {
                    player_id: player_id.as_str().to_string(),
                    score,
                },
            )
            .await?;
        Ok(())
    }

    async fn write_finalize(
        &self,
        session_id: &SessionId,
        caller: &PlayerId,
        winners: &[PlayerId],
    ) -> Result<(), LedgerError> {
        let _: AckResponse = self
            .post_json(
                format!("/v1/sessions/{session_id}/finalize"),
                FinalizeSessionRequest {
                    caller: caller.as_str().to_string(),
                    winners: winners.iter().map(|w| w.as_str().to_string()).collect(),
                },
            )
            .await?;
        Ok(())
    }

    async fn write_start_session(
        &self,
        session_id: &SessionId,
        caller: &PlayerId,
    ) -> Result<(), LedgerError> {
        let _: StartSessionResponse = self
            .post_json(
                format!("/v1/sessions/{session_id}/start"),
                StartSessionRequest {
                    caller: caller.as_str().to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn write_join_session(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> Result<(), LedgerError> {
        let _: AckResponse = self
            .post_json(
                format!("/v1/sessions/{session_id}/join"),
                JoinSessionRequest {
                    player_id: player_id.as_str().to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn write_create_session(
        &self,
        host_id: &PlayerId,
        timing: RoundTiming,
        reward_per_winner: u64,
    ) -> Result<SessionId, LedgerError> {
        let created: CreateSessionResponse = self
            .post_json(
                "/v1/sessions".to_string(),
                CreateSessionRequest {
                    host_id: host_id.as_str().to_string(),
                    round_duration_ms: timing.round_duration_ms,
                    round_count: timing.round_count,
                    reward_per_winner,
                },
            )
            .await?;
        SessionId::new(created.session_id).map_err(|v| LedgerError::MalformedData {
            reason: format!("session_id: {v}"),
        })
    }

    async fn write_claim_reward(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> Result<u64, LedgerError> {
        let claimed: ClaimRewardResponse = self
            .post_json(
                format!("/v1/sessions/{session_id}/claim"),
                ClaimRewardRequest {
                    player_id: player_id.as_str().to_string(),
                },
            )
            .await?;
        Ok(claimed.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub bind: String,
    pub ledger_url: String,
    pub session_id: Option<String>,
    pub player_id: Option<String>,
    pub client: ClientConfig,
}

impl AdapterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Out-of-range or unparsable numbers fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = ClientConfig::mvp_v1();
        let bind = non_empty("QUIZSYNC_LEDGER_BIND").unwrap_or_else(|| DEFAULT_LEDGER_BIND.to_string());
        let ledger_url = non_empty("QUIZSYNC_LEDGER_URL").unwrap_or_else(|| format!("http://{bind}"));
        let client = ClientConfig {
            tick_interval_ms: parse_ranged_u64(
                lookup("QUIZSYNC_TICK_INTERVAL_MS").as_deref(),
                100..=10_000,
                defaults.tick_interval_ms,
            ),
            poll_interval_ms: parse_ranged_u64(
                lookup("QUIZSYNC_POLL_INTERVAL_MS").as_deref(),
                250..=60_000,
                defaults.poll_interval_ms,
            ),
            ledger_timeout_ms: parse_ranged_u64(
                lookup("QUIZSYNC_LEDGER_TIMEOUT_MS").as_deref(),
                100..=120_000,
                defaults.ledger_timeout_ms,
            ),
            winner_count: parse_ranged_u64(
                lookup("QUIZSYNC_WINNER_COUNT").as_deref(),
                1..=32,
                defaults.winner_count as u64,
            ) as usize,
            ..defaults
        };
        Self {
            bind,
            ledger_url,
            session_id: non_empty("QUIZSYNC_SESSION_ID"),
            player_id: non_empty("QUIZSYNC_PLAYER_ID"),
            client,
        }
    }
}

pub fn parse_ranged_u64(raw: Option<&str>, range: RangeInclusive<u64>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| range.contains(v))
        .unwrap_or(default)
}

/// Drives one client until its session is finalized or polling is torn down.
///
/// Ledger writes and reads run on spawned tasks; the client lock is only taken for synchronous
/// steps, never across an `.await`.
pub async fn run_player_loop<F>(
    client: Arc<Mutex<QuizClient>>,
    ledger: Arc<dyn LedgerClient>,
    mut on_tick: F,
) -> Result<(), String>
where
    F: FnMut(&ClientTick, &mut QuizClient) + Send,
{
    let (tick_interval, poll_interval_ms) = {
        let c = client
            .lock()
            .map_err(|_| "quiz client lock poisoned".to_string())?;
        (c.config().tick_interval(), c.config().poll_interval_ms)
    };
    let mut ticker = tokio::time::interval(tick_interval);
    let mut last_sync: Option<WallClockMs> = None;
    let standing_in_flight = Arc::new(AtomicBool::new(false));

    loop {
        ticker.tick().await;
        let now = wall_clock_now();

        let (tick, session_id, timing, timeout, finished) = {
            let mut c = client
                .lock()
                .map_err(|_| "quiz client lock poisoned".to_string())?;
            let tick = c.tick(now);
            on_tick(&tick, &mut *c);
            let finished = tick.phase.is_terminal() && !c.is_polling();
            (
                tick,
                c.session().session_id.clone(),
                c.session().timing,
                c.config().ledger_timeout(),
                finished,
            )
        };

        if let Some(ticket) = tick.submit_ticket.clone() {
            let client = client.clone();
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let result = dispatch_submission(ledger.as_ref(), &ticket, timeout).await;
                match client.lock() {
                    Ok(mut c) => c.record_submission(&result),
                    Err(_) => warn!("quiz client lock poisoned; submission result dropped"),
                }
            });
        }

        // One standing read at a time; a slow read skips the polls that fall due behind it.
        if tick.poll_due && !standing_in_flight.swap(true, Ordering::AcqRel) {
            let client = client.clone();
            let ledger = ledger.clone();
            let session_id = session_id.clone();
            let in_flight = standing_in_flight.clone();
            tokio::spawn(async move {
                let result = fetch_standing(ledger.as_ref(), &session_id, timing, timeout, now).await;
                match client.lock() {
                    Ok(mut c) => c.apply_standing(result),
                    Err(_) => warn!("quiz client lock poisoned; standing dropped"),
                }
                in_flight.store(false, Ordering::Release);
            });
        }

        let sync_due = tick.phase == QuizPhase::Unstarted
            && last_sync.map_or(true, |last| now.saturating_since(last) >= poll_interval_ms);
        if sync_due {
            last_sync = Some(now);
            let client = client.clone();
            let ledger = ledger.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                let result = fetch_session(ledger.as_ref(), &session_id, timing, timeout).await;
                match client.lock() {
                    Ok(mut c) => match result {
                        Ok(view) => c.refresh_session(view),
                        Err(e) => c.record_sync_error(&e),
                    },
                    Err(_) => warn!("quiz client lock poisoned; session read dropped"),
                }
            });
        }

        if finished {
            info!(session_id = %session_id, "session instance finished");
            return Ok(());
        }
    }
}
