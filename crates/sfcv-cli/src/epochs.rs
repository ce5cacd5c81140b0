//! # Advance-Epochs Subcommand
//!
//! `sfcv advance-epochs <n>` seals `n` epochs through the configured gateway
//! as the configured payer and prints the advance report, including the
//! sealed epoch before and after.

use anyhow::{Context, Result};
use clap::Args;

use sfcv_client::HttpContractCaller;
use sfcv_lifecycle::{ContractBinding, EpochAdvancer, SuiteConfig, TxLog};

/// Arguments for `sfcv advance-epochs`.
#[derive(Args, Debug)]
pub struct AdvanceArgs {
    /// Number of epochs to seal.
    pub epochs: u64,

    /// Address the contract with the upgraded implementation's ABI.
    #[arg(long)]
    pub upgraded: bool,
}

/// Seal the requested epochs. A partial advance is an error naming how far
/// it got.
pub async fn run_advance(args: &AdvanceArgs, config: &SuiteConfig) -> Result<u8> {
    let caller = HttpContractCaller::new(config.client_config()?)
        .context("failed to build gateway client")?;
    let payer = config.payer_account()?;

    let contract = &config.contract;
    let mut binding = ContractBinding::pre_upgrade(
        contract.abi.clone(),
        contract.address,
        contract.proxy_abi.clone(),
    );
    if args.upgraded {
        binding = binding.upgraded(contract.upgraded_abi.clone());
    }

    let mut log = TxLog::new();
    let report = EpochAdvancer::new(&caller, config.advancer)
        .advance(&binding, &payer, args.epochs, &mut log)
        .await
        .with_context(|| format!("failed to advance {} epochs", args.epochs))?;

    let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
    println!("{json}");
    tracing::info!(
        start = %report.start_epoch,
        end = %report.end_epoch,
        transactions = log.len(),
        "advance complete"
    );
    Ok(0)
}
