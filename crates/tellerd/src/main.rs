//! tellerd - The teller kiosk driver
//!
//! Wires together:
//! - Configuration loading
//! - The transition engine
//! - A Decision Provider (scripted or HTTP)
//! - The simulated kiosk executor
//! - A scenario or interactive driver loop

mod driver;
mod scenario;

use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use teller_config::load_config;
use teller_core::Engine;
use teller_decider::HttpDecider;
use teller_host_api::{DecisionProvider, ScriptedDecider};
use teller_host_sim::{SimSettings, SimulatedKiosk};
use teller_util::default_config_path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::driver::Driver;
use crate::scenario::Scenario;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeciderKind {
    /// Canned intents from the scenario (or `@intent` lines)
    Scripted,
    /// LLM endpoint from the `[decider]` section
    Http,
}

/// tellerd - Voice-driven card reissue kiosk
#[derive(Parser, Debug)]
#[command(name = "tellerd")]
#[command(about = "Runs card reissue transactions through the teller engine", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/teller/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Session to run
    #[arg(short, long, value_enum, default_value_t = Scenario::Happy)]
    scenario: Scenario,

    /// Decision Provider
    #[arg(short, long, value_enum, default_value_t = DeciderKind::Scripted, env = "TELLER_DECIDER")]
    decider: DeciderKind,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "tellerd starting");

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        states = config.rules.state_count(),
        transitions = config.rules.transition_count(),
        "Configuration loaded"
    );

    let scripted = match args.decider {
        DeciderKind::Scripted => Some(ScriptedDecider::new()),
        DeciderKind::Http => None,
    };
    let decider: Arc<dyn DecisionProvider> = match &scripted {
        Some(scripted) => Arc::new(scripted.clone()),
        None => Arc::new(
            HttpDecider::new(&config.decider).context("Failed to create HTTP decider")?,
        ),
    };

    // Scenarios pin device behavior; interactive sessions read it from the environment
    let settings = match args.scenario {
        Scenario::Interactive => SimSettings::from_env(),
        scenario => scenario.settings(),
    };
    let executor = Arc::new(SimulatedKiosk::new(settings));

    let engine = Engine::new(Arc::new(config.rules), decider, executor);
    let mut driver = Driver::new(
        engine,
        scripted,
        config.service.max_chain,
        config.service.tick_interval,
    );

    let txn = match args.scenario {
        Scenario::Interactive => driver.run_interactive().await?,
        scenario => driver.run_scenario(scenario).await?,
    };

    info!(transaction_id = %txn.id, state = %txn.state, "Transaction ended");
    println!("final state: {}", txn.state);

    if let Some(expected) = args.scenario.expected_end() {
        ensure!(
            txn.state == expected,
            "scenario {:?} ended in {} instead of {}",
            args.scenario,
            txn.state,
            expected
        );
    }
    Ok(())
}
