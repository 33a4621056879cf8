//! Sealpost simulation runner.
//!
//! Runs the built-in scenarios against a seeded world and exits non-zero on
//! the first failure, printing the seed so the run can be replayed.
//!
//! # Usage
//!
//! ```bash
//! # Every scenario with a random seed
//! sealpost-sim
//!
//! # Replay one scenario
//! sealpost-sim --seed 7 --scenario abandoned-chat --log-level debug
//! ```

use std::process::ExitCode;

use clap::Parser;
use sealpost_harness::Scenario;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sealpost deterministic simulation
#[derive(Parser, Debug)]
#[command(name = "sealpost-sim")]
#[command(about = "Run Sealpost end-to-end scenarios under a seeded simulation")]
#[command(version)]
struct Args {
    /// World seed (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Run only this scenario
    #[arg(long)]
    scenario: Option<Scenario>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let seed = args.seed.unwrap_or_else(rand::random);
    let scenarios = args.scenario.map_or_else(|| Scenario::ALL.to_vec(), |one| vec![one]);

    for scenario in scenarios {
        if let Err(error) = scenario.run(seed).await {
            tracing::error!(%scenario, seed, %error, "scenario failed");
            return ExitCode::FAILURE;
        }
    }

    tracing::info!(seed, "all scenarios passed");
    ExitCode::SUCCESS
}
