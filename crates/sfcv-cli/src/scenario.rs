//! # Scenario Subcommands
//!
//! `sfcv run`, `sfcv basic`, `sfcv before-upgrade`, and `sfcv upgrade` all
//! run one [`Scenario`] and differ only in which. By default the suite talks
//! to the configured gateway as the configured payer; `--simulate` runs it
//! against a fresh in-process simulator instead, with the simulator's payer
//! and upgrade bytecode.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use sfcv_client::{AbiId, HttpContractCaller};
use sfcv_lifecycle::{Orchestrator, RunReport, Scenario, SuiteConfig};
use sfcv_stub::{SimulatedChain, StubConfig, SFC_V2_BYTECODE};

/// Arguments shared by the scenario subcommands.
#[derive(Args, Debug, Default)]
pub struct ScenarioArgs {
    /// Hex file with the new implementation's bytecode. Overrides
    /// `contract.implementation_bytecode`.
    #[arg(long)]
    pub bytecode: Option<PathBuf>,

    /// Also write the run report to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Run against an in-process simulator instead of the gateway.
    #[arg(long)]
    pub simulate: bool,
}

/// Run `scenario`, print its report, and return the exit code.
pub async fn run_scenario(
    scenario: Scenario,
    args: &ScenarioArgs,
    config: &SuiteConfig,
) -> Result<u8> {
    let report = if args.simulate {
        simulate(scenario, config).await
    } else {
        against_gateway(scenario, args, config).await?
    };
    emit(&report, args.report.as_deref())?;
    Ok(if report.success { 0 } else { 1 })
}

async fn against_gateway(
    scenario: Scenario,
    args: &ScenarioArgs,
    config: &SuiteConfig,
) -> Result<RunReport> {
    let caller = HttpContractCaller::new(config.client_config()?)
        .context("failed to build gateway client")?;
    let payer = config.payer_account()?;

    let mut orchestrator = Orchestrator::new(&caller, config, payer);
    if scenario.needs_bytecode() {
        orchestrator = orchestrator.with_bytecode(load_bytecode(args, config)?);
    }
    tracing::info!(endpoint = %caller.endpoint(), %scenario, "running against gateway");
    Ok(orchestrator.run(scenario).await)
}

async fn simulate(scenario: Scenario, config: &SuiteConfig) -> RunReport {
    let chain = SimulatedChain::new(StubConfig::default());
    let stub = chain.config();

    let mut config = config.clone();
    config.contract.address = stub.proxy_address;
    config.contract.abi = AbiId::new(stub.v1_abi);
    config.contract.upgraded_abi = AbiId::new(stub.v2_abi);
    config.contract.proxy_abi = AbiId::new(stub.proxy_abi);

    tracing::info!(%scenario, "running against in-process simulator");
    Orchestrator::new(&chain, &config, chain.payer())
        .with_bytecode(SFC_V2_BYTECODE.to_vec())
        .run(scenario)
        .await
}

fn load_bytecode(args: &ScenarioArgs, config: &SuiteConfig) -> Result<Vec<u8>> {
    match &args.bytecode {
        Some(path) => {
            let mut config = config.clone();
            config.contract.implementation_bytecode = Some(path.clone());
            config.bytecode()
        }
        None => config.bytecode(),
    }
    .context("failed to load implementation bytecode")
}

/// Print the report as JSON on stdout, optionally save it, and log a
/// per-phase summary.
pub fn emit(report: &RunReport, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize run report")?;
    println!("{json}");
    if let Some(path) = path {
        std::fs::write(path, &json)
            .with_context(|| format!("failed to write report: {}", path.display()))?;
    }

    for outcome in &report.phases {
        tracing::info!(phase = %outcome.phase, status = ?outcome.status, "phase result");
    }
    match report.failure() {
        Some(failed) => tracing::error!(
            phase = %failed.phase,
            error = failed.error.as_deref().unwrap_or("unknown"),
            "run failed"
        ),
        None => tracing::info!(
            run_id = %report.run_id,
            transactions = report.transactions.len(),
            "run succeeded"
        ),
    }
    Ok(())
}
