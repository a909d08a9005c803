//! `hc`: operator CLI for the hybrid consensus engine
//!
//! Every invocation builds its own engine. `start` runs a demo node over
//! in-memory collaborators in the foreground until ctrl-c; the other commands
//! answer from the loaded configuration.

mod commands;
mod telemetry;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hc_consensus::{ConsensusEngine, WeightConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Hybrid PoW/PoS/PoH consensus engine
#[derive(Parser, Debug)]
#[command(name = "hc")]
#[command(about = "Hybrid PoW/PoS/PoH consensus engine", version)]
struct Cli {
    /// Engine configuration (JSON); defaults come from HC_* variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node with in-memory collaborators until ctrl-c
    Start {
        /// Stop on its own after this many seconds
        #[arg(long)]
        run_for: Option<u64>,
    },
    /// Stop the production loops (a `start` node stops on ctrl-c)
    Stop,
    /// Print engine status as JSON
    Info,
    /// Weights for a demand/stake sample
    Weights {
        #[arg(allow_negative_numbers = true)]
        demand: f64,
        #[arg(allow_negative_numbers = true)]
        stake: f64,
    },
    /// Threshold for a demand/stake sample
    Threshold {
        #[arg(allow_negative_numbers = true)]
        demand: f64,
        #[arg(allow_negative_numbers = true)]
        stake: f64,
    },
    /// Replace the weight configuration
    SetWeightConfig {
        alpha: f64,
        beta: f64,
        gamma: f64,
        dmax: f64,
        smax: f64,
    },
    /// Print the weight configuration as JSON
    GetWeightConfig,
}

async fn run(cli: Cli) -> Result<()> {
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Start { run_for } => {
            commands::run_node(config, run_for.map(Duration::from_secs)).await?;
        }
        Command::Stop => println!("{}", commands::stop()),
        Command::Info => println!("{}", commands::info(config).await?),
        Command::Weights { demand, stake } => {
            let engine = ConsensusEngine::new(config)?;
            println!("{}", commands::format_weights(&engine.calculate_weights(demand, stake)));
        }
        Command::Threshold { demand, stake } => {
            let engine = ConsensusEngine::new(config)?;
            println!("{}", commands::format_threshold(engine.compute_threshold(demand, stake)));
        }
        Command::SetWeightConfig {
            alpha,
            beta,
            gamma,
            dmax,
            smax,
        } => {
            let cfg = WeightConfig::new(alpha, beta, gamma, dmax, smax);
            let engine = ConsensusEngine::new(config)?;
            engine
                .set_weight_config(cfg)
                .context("rejected weight config")?;
            if let Some(path) = cli.config.as_deref() {
                commands::persist_weight_config(path, &cfg)?;
            }
            println!("weight config updated");
        }
        Command::GetWeightConfig => {
            let engine = ConsensusEngine::new(config)?;
            println!("{}", serde_json::to_string_pretty(&engine.weight_config())?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init(&telemetry::TelemetryConfig::from_env()) {
        eprintln!("warning: logging disabled: {e:#}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
