//! Avatar Simulation Runner
//!
//! Runs the month-stepped simulation against the offline rule-based oracle
//! and optionally streams every event to a JSONL file.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sim_core::{EventLogger, RuleBasedModel, SimConfig, Simulator};

/// Command line arguments for the simulation
#[derive(Parser, Debug)]
#[command(name = "avatar_sim")]
#[command(about = "A month-stepped simulation of cultivating avatars")]
struct Args {
    /// TOML configuration file; defaults apply to anything it leaves out
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed, overriding the configured one
    #[arg(long)]
    seed: Option<u64>,

    /// Number of months to simulate
    #[arg(long, default_value_t = 120)]
    ticks: u64,

    /// Write every event as JSON lines to this file
    #[arg(long)]
    events_out: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

type BoxError = Box<dyn std::error::Error>;

fn load_config(args: &Args) -> Result<SimConfig, BoxError> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    Ok(config)
}

async fn run(args: Args) -> Result<(), BoxError> {
    let config = load_config(&args)?;
    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let mut logger = match &args.events_out {
        Some(path) => EventLogger::new(path)?,
        None => EventLogger::null(),
    };

    println!("Avatar Simulation");
    println!("=================");
    println!("Seed: {}", config.simulation.seed);
    println!("Ticks: {}", args.ticks);
    println!("Population: {}", config.simulation.initial_population);
    println!();

    let model = Arc::new(RuleBasedModel::new(config.simulation.seed));
    let mut sim = Simulator::new(config, model)?;

    for tick in 0..args.ticks {
        let now = sim.now();
        let events = sim.step().await?;
        logger.log_batch(&events)?;

        for event in events.iter().filter(|e| e.is_major) {
            println!("[{}] {}", now, event.content);
        }
        if tick > 0 && tick % 12 == 0 {
            println!("-- {} / {} months, {} alive", tick, args.ticks, sim.live_count());
        }
    }
    logger.flush()?;

    println!();
    println!(
        "Simulation complete. Ran {} months (ending on {}), {} alive, {} events recorded.",
        args.ticks,
        sim.now(),
        sim.live_count(),
        sim.history().len()
    );
    info!(logged = logger.event_count(), "event log closed");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
