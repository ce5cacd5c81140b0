//! # sfcv — SFC Upgrade Suite CLI
//!
//! Entry point for the `sfcv` command-line tool.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sfcv_cli::epochs::{run_advance, AdvanceArgs};
use sfcv_cli::load_config;
use sfcv_cli::scenario::{run_scenario, ScenarioArgs};
use sfcv_cli::stub::{run_stub, StubArgs};
use sfcv_lifecycle::Scenario;

/// SFC Upgrade Suite: exercise the staking contract's lifecycle across a
/// proxy upgrade.
#[derive(Parser, Debug)]
#[command(name = "sfcv", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the suite configuration file (YAML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Full scenario: stakers and delegations before the upgrade, withdrawn
    /// and exercised after it.
    Run(ScenarioArgs),

    /// Two stakers, one withdrawn on each side of the upgrade.
    Basic(ScenarioArgs),

    /// The before-upgrade half of `basic`, without upgrading.
    BeforeUpgrade(ScenarioArgs),

    /// Deploy the new implementation, upgrade the proxy, migrate storage.
    Upgrade(ScenarioArgs),

    /// Seal epochs on the configured contract.
    AdvanceEpochs(AdvanceArgs),

    /// Serve the in-memory simulator over JSON-RPC.
    Stub(StubArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
    let (scenario, args) = match cli.command {
        Commands::Stub(args) => return run_stub(&args).await,
        Commands::AdvanceEpochs(args) => {
            let config = load_config(cli.config.as_deref())?;
            return run_advance(&args, &config).await;
        }
        Commands::Run(args) => (Scenario::Full, args),
        Commands::Basic(args) => (Scenario::Basic, args),
        Commands::BeforeUpgrade(args) => (Scenario::BeforeUpgrade, args),
        Commands::Upgrade(args) => (Scenario::UpgradeOnly, args),
    };
    let config = load_config(cli.config.as_deref())?;
    run_scenario(scenario, &args, &config).await
}

/// Logs go to stderr; stdout carries only reports.
fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}
