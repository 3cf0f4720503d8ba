#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use quizsync_engines::placeholder::placeholder_score;
use quizsync_kernel_contracts::common::WallClockMs;
use quizsync_kernel_contracts::question::QuestionBank;
use quizsync_kernel_contracts::session::{PlayerId, RoundTiming, SessionId};
use quizsync_kernel_contracts::standing::StandingSnapshot;
use quizsync_os::ledger_client::{InMemoryLedgerClient, LedgerClient, LedgerClock};
use quizsync_os::quiz_client::{ClientConfig, QuizClient};
use quizsync_os::session_sync::fetch_session;
use quizsync_storage::ledger_store::LedgerStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

pub const DEMO_EPOCH_MS: u64 = 1_700_000_000_000;
pub const DEMO_TICK_MS: u64 = 1_000;
/// Simulated time past the last round; covers the first standing polls after submission.
pub const DEMO_TAIL_MS: u64 = 6_000;
pub const DEMO_ACCURACY: f64 = 0.7;
pub const DEMO_SKIP_PROBABILITY: f64 = 0.1;
pub const MAX_DEMO_BOTS: usize = 16;
pub const MAX_DEMO_GHOSTS: usize = 8;
pub const MAX_DEMO_WINNERS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoOptions {
    pub seed: u64,
    /// Players driven by a full `QuizClient`.
    pub bots: usize,
    /// Joined players that never run a client; their scores come from `placeholder_score`.
    pub ghosts: usize,
    pub winners: usize,
    pub reward: u64,
}

impl DemoOptions {
    pub fn mvp_v1() -> Self {
        Self {
            seed: 7,
            bots: 3,
            ghosts: 0,
            winners: 1,
            reward: 100,
        }
    }

    /// `--seed N --bots N --ghosts N --winners N --reward N`, any order, all optional.
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        let mut opts = Self::mvp_v1();
        let mut it = args.iter();
        while let Some(flag) = it.next() {
            let value = it
                .next()
                .ok_or_else(|| format!("missing value for {flag}"))?;
            match flag.as_str() {
                "--seed" => opts.seed = parse_flag(flag, value)?,
                "--bots" => opts.bots = parse_flag(flag, value)?,
                "--ghosts" => opts.ghosts = parse_flag(flag, value)?,
                "--winners" => opts.winners = parse_flag(flag, value)?,
                "--reward" => opts.reward = parse_flag(flag, value)?,
                _ => return Err(format!("unknown demo flag: {flag}")),
            }
        }
        opts.check()?;
        Ok(opts)
    }

    fn check(&self) -> Result<(), String> {
        if !(1..=MAX_DEMO_BOTS).contains(&self.bots) {
            return Err(format!("--bots must be within 1..={MAX_DEMO_BOTS}"));
        }
        if self.ghosts > MAX_DEMO_GHOSTS {
            return Err(format!("--ghosts must be at most {MAX_DEMO_GHOSTS}"));
        }
        if !(1..=MAX_DEMO_WINNERS).contains(&self.winners) {
            return Err(format!("--winners must be within 1..={MAX_DEMO_WINNERS}"));
        }
        Ok(())
    }
}

fn parse_flag<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("{flag} expects a number, got {value}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    pub session_id: SessionId,
    pub seed: u64,
    pub round_count: u32,
    pub standing: StandingSnapshot,
    pub ghosts: Vec<PlayerId>,
    pub winners: Vec<PlayerId>,
    pub claims: Vec<(PlayerId, u64)>,
}

impl DemoReport {
    pub fn render(&self) -> String {
        let mut out = format!(
            "session {} seed {} rounds {}\n",
            self.session_id, self.seed, self.round_count
        );
        for e in &self.standing.entries {
            let tag = if self.ghosts.contains(&e.player_id) {
                " (placeholder)"
            } else {
                ""
            };
            out.push_str(&format!("  #{} {} {}{}\n", e.rank, e.player_id, e.score, tag));
        }
        let winners: Vec<&str> = self.winners.iter().map(|w| w.as_str()).collect();
        out.push_str(&format!("winners: {}\n", winners.join(", ")));
        for (player, amount) in &self.claims {
            out.push_str(&format!("claimed: {player} {amount}\n"));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlannedAnswer {
    /// Offset from the session start; always a tick boundary inside the question window.
    at_ms: u64,
    choice: u8,
}

struct Bot {
    client: QuizClient,
    plan: Vec<PlannedAnswer>,
}

fn plan_answers(
    rng: &mut StdRng,
    questions: &QuestionBank,
    timing: RoundTiming,
    feedback_window_ms: u64,
) -> Vec<PlannedAnswer> {
    let question_steps = timing.round_duration_ms.saturating_sub(feedback_window_ms) / DEMO_TICK_MS;
    let mut plan = Vec::new();
    if question_steps < 2 {
        return plan;
    }
    for r in 0..timing.round_count {
        let Some(card) = questions.card_for_round(r) else {
            continue;
        };
        if rng.gen_bool(DEMO_SKIP_PROBABILITY) {
            continue;
        }
        let step = rng.gen_range(1..question_steps);
        let choice = if rng.gen_bool(DEMO_ACCURACY) {
            card.correct_choice
        } else {
            rng.gen_range(0..card.options.len()) as u8
        };
        plan.push(PlannedAnswer {
            at_ms: u64::from(r) * timing.round_duration_ms + step * DEMO_TICK_MS,
            choice,
        });
    }
    plan
}

fn demo_player(prefix: &str, n: usize) -> Result<PlayerId, String> {
    PlayerId::new(format!("0x{prefix}{n:02}")).map_err(|v| v.to_string())
}

/// Plays one whole session against an in-process ledger on a simulated clock.
pub async fn run_demo(opts: &DemoOptions) -> Result<DemoReport, String> {
    opts.check()?;
    let clock = Arc::new(AtomicU64::new(DEMO_EPOCH_MS));
    let ledger_clock: LedgerClock = {
        let clock = clock.clone();
        Arc::new(move || WallClockMs(clock.load(Ordering::SeqCst)))
    };
    let ledger = InMemoryLedgerClient::new(
        Arc::new(Mutex::new(LedgerStore::new_in_memory())),
        ledger_clock,
    );

    let timing = RoundTiming::mvp_v1();
    let questions = QuestionBank::mvp_default();
    let config = ClientConfig {
        winner_count: opts.winners,
        ..ClientConfig::mvp_v1()
    };
    let host = PlayerId::new("0xhost").map_err(|v| v.to_string())?;
    let bot_ids = (1..=opts.bots)
        .map(|n| demo_player("bot", n))
        .collect::<Result<Vec<_>, _>>()?;
    let ghost_ids = (1..=opts.ghosts)
        .map(|n| demo_player("ghost", n))
        .collect::<Result<Vec<_>, _>>()?;

    let sid = ledger
        .write_create_session(&host, timing, opts.reward)
        .await
        .map_err(|e| e.to_string())?;
    for p in bot_ids.iter().chain(ghost_ids.iter()) {
        ledger
            .write_join_session(&sid, p)
            .await
            .map_err(|e| e.to_string())?;
    }
    ledger
        .write_start_session(&sid, &host)
        .await
        .map_err(|e| e.to_string())?;
    let view = fetch_session(&ledger, &sid, timing, config.ledger_timeout())
        .await
        .map_err(|e| e.to_string())?;
    info!(session_id = %sid, seed = opts.seed, bots = opts.bots, ghosts = opts.ghosts, "demo session started");

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut bots = Vec::with_capacity(bot_ids.len());
    for id in bot_ids {
        let client = QuizClient::new(view.session.clone(), id, questions.clone(), config)
            .map_err(|v| v.to_string())?;
        let plan = plan_answers(&mut rng, &questions, timing, config.phase.feedback_window_ms);
        bots.push(Bot { client, plan });
    }
    let mut host_client = QuizClient::new(view.session, host, questions, config)
        .map_err(|v| v.to_string())?;

    let total_ms = timing.total_duration_ms();
    let mut ghosts_submitted = false;
    for elapsed in (0..=total_ms + DEMO_TAIL_MS).step_by(DEMO_TICK_MS as usize) {
        let now = WallClockMs(DEMO_EPOCH_MS + elapsed);
        clock.store(now.0, Ordering::SeqCst);

        for bot in &mut bots {
            bot.client.tick_and_dispatch(&ledger, now).await;
            if let Some(answer) = bot.plan.iter().find(|a| a.at_ms == elapsed) {
                let outcome = bot
                    .client
                    .select(answer.choice, now)
                    .map_err(|v| v.to_string())?;
                debug!(player_id = %bot.client.local(), ?outcome, "bot answered");
            }
        }

        if !ghosts_submitted && elapsed >= total_ms {
            for g in &ghost_ids {
                let score = placeholder_score(&sid, g);
                ledger
                    .write_submit_score(&sid, g, score)
                    .await
                    .map_err(|e| e.to_string())?;
                debug!(player_id = %g, score, "placeholder score submitted");
            }
            ghosts_submitted = true;
        }

        host_client.tick_and_dispatch(&ledger, now).await;
    }

    let standing = host_client
        .standing()
        .cloned()
        .ok_or_else(|| "host never observed a standing".to_string())?;
    let winners = host_client
        .finalize(&ledger)
        .await
        .map_err(|e| e.to_string())?;
    let mut claims = Vec::with_capacity(winners.len());
    for w in &winners {
        let amount = ledger
            .write_claim_reward(&sid, w)
            .await
            .map_err(|e| e.to_string())?;
        claims.push((w.clone(), amount));
    }
    info!(session_id = %sid, winners = winners.len(), "demo session finalized");

    Ok(DemoReport {
        session_id: sid,
        seed: opts.seed,
        round_count: timing.round_count,
        standing,
        ghosts: ghost_ids,
        winners,
        claims,
    })
}

pub async fn execute_demo_command(subcommand: &str, args: &[String]) -> Result<String, String> {
    match subcommand {
        "run" => {
            let opts = DemoOptions::from_args(args)?;
            run_demo(&opts).await.map(|report| report.render())
        }
        "placeholder" => {
            let (Some(sid), Some(player)) = (args.first(), args.get(1)) else {
                return Err("placeholder requires <session_id> <player_id>".to_string());
            };
            let sid = SessionId::new(sid.as_str()).map_err(|v| v.to_string())?;
            let player = PlayerId::new(player.as_str()).map_err(|v| v.to_string())?;
            Ok(placeholder_score(&sid, &player).to_string())
        }
        _ => Err(format!("unknown demo subcommand: {subcommand}")),
    }
}
