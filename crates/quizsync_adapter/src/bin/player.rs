#![forbid(unsafe_code)]

use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quizsync_adapter::{run_player_loop, AdapterConfig, HttpLedgerClient};
use quizsync_kernel_contracts::question::QuestionBank;
use quizsync_kernel_contracts::round::QuizPhase;
use quizsync_kernel_contracts::session::{PlayerId, RoundTiming, SessionId};
use quizsync_os::ledger_client::{bounded, LedgerClient};
use quizsync_os::quiz_client::{ClientTick, QuizClient};
use quizsync_os::reward_finalizer::dispatch_finalize;
use quizsync_os::score_capture::SelectOutcome;
use quizsync_os::session_sync::{fetch_session, LobbyStatus};
use quizsync_os::wall_clock_now;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: quizsync_player <create [rounds] [round_ms] [reward] | join <session> | start <session> | lobby <session> | play <session> | claim <session>>";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(err) = run(args).await {
        eprintln!("quizsync_player: {err}");
        std::process::exit(2);
    }
}

async fn run(args: Vec<String>) -> Result<(), String> {
    let config = AdapterConfig::from_env();
    let identity = config
        .player_id
        .clone()
        .ok_or_else(|| "QUIZSYNC_PLAYER_ID is required".to_string())
        .and_then(|raw| PlayerId::new(raw).map_err(|v| v.to_string()))?;
    let timeout = config.client.ledger_timeout();
    let ledger = Arc::new(HttpLedgerClient::new(config.ledger_url.clone(), timeout));

    let Some(command) = args.first().map(String::as_str) else {
        return Err(USAGE.to_string());
    };
    let session_arg = || -> Result<SessionId, String> {
        args.get(1)
            .cloned()
            .or_else(|| config.session_id.clone())
            .ok_or_else(|| USAGE.to_string())
            .and_then(|raw| SessionId::new(raw).map_err(|v| v.to_string()))
    };

    match command {
        "create" => {
            let defaults = RoundTiming::mvp_v1();
            let rounds = parse_arg(&args, 1, defaults.round_count)?;
            let round_ms = parse_arg(&args, 2, defaults.round_duration_ms)?;
            let reward = parse_arg(&args, 3, 0u64)?;
            let timing = RoundTiming::v1(round_ms, rounds).map_err(|v| v.to_string())?;
            let sid = bounded(
                "write_create_session",
                timeout,
                ledger.write_create_session(&identity, timing, reward),
            )
            .await
            .map_err(|e| e.to_string())?;
            println!("{sid}");
            Ok(())
        }
        "join" => {
            let sid = session_arg()?;
            bounded("write_join_session", timeout, ledger.write_join_session(&sid, &identity))
                .await
                .map_err(|e| e.to_string())?;
            println!("joined {sid} as {identity}");
            Ok(())
        }
        "start" => {
            let sid = session_arg()?;
            bounded("write_start_session", timeout, ledger.write_start_session(&sid, &identity))
                .await
                .map_err(|e| e.to_string())?;
            println!("started {sid}");
            Ok(())
        }
        "lobby" => {
            let sid = session_arg()?;
            let view = fetch_session(ledger.as_ref(), &sid, RoundTiming::mvp_v1(), timeout)
                .await
                .map_err(|e| e.to_string())?;
            let lobby = LobbyStatus::observe(&view.session, &identity);
            println!(
                "session={sid} state={:?} players={} host={} joined={} ready={}",
                lobby.lifecycle,
                lobby.player_count,
                lobby.is_host,
                lobby.has_joined,
                lobby.ready_to_enter
            );
            Ok(())
        }
        "claim" => {
            let sid = session_arg()?;
            let amount = bounded(
                "write_claim_reward",
                timeout,
                ledger.write_claim_reward(&sid, &identity),
            )
            .await
            .map_err(|e| e.to_string())?;
            println!("claimed {amount}");
            Ok(())
        }
        "play" => play(session_arg()?, identity, config, ledger).await,
        _ => Err(USAGE.to_string()),
    }
}

fn parse_arg<T: std::str::FromStr>(args: &[String], idx: usize, default: T) -> Result<T, String> {
    match args.get(idx) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("argument {idx} is not a number: {raw}")),
    }
}

async fn play(
    sid: SessionId,
    identity: PlayerId,
    config: AdapterConfig,
    ledger: Arc<HttpLedgerClient>,
) -> Result<(), String> {
    let timeout = config.client.ledger_timeout();
    let view = fetch_session(ledger.as_ref(), &sid, RoundTiming::mvp_v1(), timeout)
        .await
        .map_err(|e| e.to_string())?;
    let client = QuizClient::new(
        view.session,
        identity,
        QuestionBank::mvp_default(),
        config.client,
    )
    .map_err(|v| v.to_string())?;
    println!("ledger: {} role: {:?}", ledger.base_url(), client.role());
    let client = Arc::new(Mutex::new(client));
    let ledger: Arc<dyn LedgerClient> = ledger;

    let input = tokio::spawn(read_commands(client.clone(), ledger.clone(), timeout));
    let outcome = tokio::select! {
        r = run_player_loop(client.clone(), ledger, print_tick) => r,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };
    input.abort();
    outcome
}

fn print_tick(tick: &ClientTick, client: &mut QuizClient) {
    if let Some(t) = &tick.transition {
        match t.to {
            QuizPhase::Question { round_index } => {
                if let Some(card) = client.questions().card_for_round(round_index) {
                    println!("\nround {}: {}", round_index + 1, card.prompt);
                    for (i, option) in card.options.iter().enumerate() {
                        println!("  [{i}] {option}");
                    }
                }
            }
            QuizPhase::Feedback { round_index } => {
                if let Some(card) = client.questions().card_for_round(round_index) {
                    println!("answer: [{}]", card.correct_choice);
                }
            }
            QuizPhase::Leaderboard => println!("\nfinal score: {}", client.cumulative_score()),
            QuizPhase::Unstarted => {}
        }
    }
    for v in &tick.verdicts {
        println!(
            "round {} {} +{} (total {})",
            v.round_index + 1,
            if v.correct { "correct" } else { "missed" },
            v.awarded,
            client.cumulative_score()
        );
    }
    for n in client.drain_notices() {
        eprintln!("notice: {}", n.message);
    }
    if tick.poll_due {
        if let Some(standing) = client.standing() {
            for e in &standing.entries {
                println!("  #{} {} {}", e.rank, e.player_id, e.score);
            }
        }
    }
}

async fn read_commands(
    client: Arc<Mutex<QuizClient>>,
    ledger: Arc<dyn LedgerClient>,
    timeout: Duration,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_ascii_lowercase();
        if let Ok(choice) = line.parse::<u8>() {
            let outcome = match client.lock() {
                Ok(mut c) => c.select(choice, wall_clock_now()).map_err(|v| v.to_string()),
                Err(_) => Err("quiz client lock poisoned".to_string()),
            };
            match outcome {
                Ok(SelectOutcome::Captured(a)) => println!(
                    "locked [{}] for {} points if correct",
                    a.choice_index, a.locked_score
                ),
                Ok(other) => println!("ignored: {other:?}"),
                Err(e) => eprintln!("select failed: {e}"),
            }
        } else if line == "finalize" {
            let ticket = match client.lock() {
                Ok(mut c) => c.prepare_finalize().map_err(|e| e.to_string()),
                Err(_) => Err("quiz client lock poisoned".to_string()),
            };
            let ticket = match ticket {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("finalize refused: {e}");
                    continue;
                }
            };
            let result = dispatch_finalize(ledger.as_ref(), &ticket, timeout).await;
            if let Ok(mut c) = client.lock() {
                c.record_finalize(&ticket, &result);
            }
            match result {
                Ok(()) => {
                    let winners: Vec<&str> = ticket.winners.iter().map(|w| w.as_str()).collect();
                    println!("finalized; winners: {}", winners.join(", "));
                }
                Err(e) => eprintln!("finalize failed: {e}"),
            }
        } else if !line.is_empty() {
            println!("commands: <option number> | finalize");
        }
    }
}
