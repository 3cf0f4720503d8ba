#![forbid(unsafe_code)]

use std::env;

use quizsync_tools::demo_cli::execute_demo_command;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: quizsync demo <run [--seed N] [--bots N] [--ghosts N] [--winners N] [--reward N] | placeholder <session_id> <player_id>>";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let result = match (args.first().map(String::as_str), args.get(1)) {
        (Some("demo"), Some(sub)) => execute_demo_command(sub, &args[2..]).await,
        _ => Err(USAGE.to_string()),
    };
    match result {
        Ok(out) => print!("{out}"),
        Err(err) => {
            eprintln!("quizsync: {err}");
            std::process::exit(2);
        }
    }
}
