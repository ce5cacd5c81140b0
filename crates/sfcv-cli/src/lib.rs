//! # sfcv-cli — CLI for the SFC Upgrade Suite
//!
//! Provides the `sfcv` command-line interface.
//!
//! ## Subcommands
//!
//! - `sfcv run` — full four-phase scenario across the proxy upgrade.
//! - `sfcv basic` — two-staker scenario across the upgrade.
//! - `sfcv before-upgrade` — the before-upgrade half of `basic`, no upgrade.
//! - `sfcv upgrade` — deploy, upgrade, and migrate storage only.
//! - `sfcv advance-epochs <n>` — seal `n` epochs.
//! - `sfcv stub` — serve the in-memory simulator over JSON-RPC.
//!
//! Scenario commands print the run report as JSON on stdout and exit 1 when
//! any phase failed. Logs go to stderr.
//!
//! ```bash
//! sfcv stub --port 18545 &
//! SFCV_PAYER_ADDRESS=0x... SFCV_PAYER_KEY=0x... sfcv -v run --bytecode sfc-v2.hex
//! sfcv basic --simulate
//! ```

pub mod epochs;
pub mod scenario;
pub mod stub;

use std::path::Path;

use anyhow::{Context, Result};

use sfcv_lifecycle::SuiteConfig;

/// Load the suite configuration from `path` (or defaults) with `SFCV_*`
/// environment overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<SuiteConfig> {
    let config = SuiteConfig::load(path).with_context(|| match path {
        Some(p) => format!("failed to load configuration from {}", p.display()),
        None => "failed to load configuration".to_string(),
    })?;
    tracing::debug!(endpoint = %config.endpoint, contract = %config.contract.address, "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_is_reported_with_path() {
        let err = load_config(Some(Path::new("/nonexistent/sfcv.yaml"))).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/sfcv.yaml"));
    }

    #[test]
    fn config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sfcv.yaml");
        std::fs::write(&path, "scenario:\n  stakers: 4\n  stakers_to_prepare: 2\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.scenario.stakers, 4);
        assert_eq!(config.scenario.stakers_to_prepare, 2);
    }
}
