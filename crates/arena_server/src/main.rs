//! Hex Arena server binary.
//!
//! Runs a bot match and prints every outbound message as a JSON line on
//! stdout. Logs go to stderr.
//!
//! ```bash
//! cargo run -p arena_server -- --players 4 --seed 7 --time-scale 0.01
//! RUST_LOG=arena_server=debug cargo run -p arena_server -- --config arena.ron
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use arena_server::headless::{run_match, HeadlessOptions};
use arena_server::ServerConfig;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "arena_server")]
#[command(about = "Hex Arena room driver with bot players")]
#[command(version)]
struct Cli {
    /// RON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bots in the match
    #[arg(short, long, default_value = "4")]
    players: usize,

    /// Room seed (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Multiplier on phase timers, overriding the config
    #[arg(long)]
    time_scale: Option<f64>,

    /// Stop after this many rounds
    #[arg(long, default_value = "40")]
    max_rounds: u32,

    /// Skip combat replay batches in the output
    #[arg(long)]
    no_replays: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> arena_server::Result<()> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(scale) = cli.time_scale {
        config.time_scale = scale;
    }
    let options = HeadlessOptions {
        players: cli.players,
        seed: cli.seed.unwrap_or_else(rand::random),
        max_rounds: Some(cli.max_rounds),
    };
    tracing::info!(players = options.players, seed = options.seed, "Starting Hex Arena match");

    let stdout = std::io::stdout();
    let summary = run_match(config, &options, |envelope| {
        if cli.no_replays
            && matches!(
                envelope.message,
                arena_server::protocol::ServerMessage::CombatBatch { .. }
            )
        {
            return;
        }
        match envelope.to_json() {
            Ok(line) => {
                let mut out = stdout.lock();
                if writeln!(out, "{line}").is_err() {
                    tracing::warn!("stdout closed");
                }
            }
            Err(err) => tracing::warn!(%err, "Failed to encode message"),
        }
    })
    .await?;

    tracing::info!(
        winner = ?summary.winner,
        rounds = summary.rounds,
        finished = summary.finished,
        "Match finished"
    );
    Ok(())
}
