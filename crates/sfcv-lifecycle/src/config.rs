//! # Suite Configuration
//!
//! A run is configured from a YAML file with every section optional:
//!
//! ```yaml
//! endpoint: http://127.0.0.1:18545
//! timeout_secs: 60
//! contract:
//!   address: "0xfc00face00000000000000000000000000000000"
//!   abi: sfc-v1
//!   upgraded_abi: sfc-v2
//!   proxy_abi: upgradability-proxy
//!   implementation_bytecode: ./sfc-v2.hex
//! payer:
//!   address: "0x..."
//!   secret_key: "0x..."
//! amounts: { stake: "3175000", delegation: "2" }
//! scenario: { stakers: 2, delegations_per_staker: 1 }
//! advancer: { max_retries: 5 }
//! waiter: { max_wait_secs: 300 }
//! upgrade: { lookback_blocks: 100 }
//! ```
//!
//! Environment variables override the file:
//!
//! | Variable | Field |
//! |---|---|
//! | `SFCV_ENDPOINT` | `endpoint` |
//! | `SFCV_CONTRACT_ADDRESS` | `contract.address` |
//! | `SFCV_PAYER_ADDRESS` | `payer.address` |
//! | `SFCV_PAYER_KEY` | `payer.secret_key` |
//! | `SFCV_TIMEOUT_SECS` | `timeout_secs` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sfcv_client::{AbiId, ClientConfig};
use sfcv_core::{Account, Address, Amount, SecretKey};

use crate::epoch::AdvancePolicy;
use crate::wait::WaitPolicy;

/// Address the staking contract proxy is deployed at on SFC networks.
pub const DEFAULT_SFC_ADDRESS: Address = Address::from_bytes([
    0xfc, 0x00, 0xfa, 0xce, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
]);

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {var}: {reason}")]
    InvalidOverride { var: &'static str, reason: String },

    #[error("invalid endpoint {0}: {1}")]
    InvalidEndpoint(String, String),

    #[error("no payer configured (set payer in the config file or SFCV_PAYER_ADDRESS and SFCV_PAYER_KEY)")]
    MissingPayer,

    #[error("no implementation bytecode configured")]
    MissingBytecode,

    #[error("implementation bytecode in {path} is not valid hex: {reason}")]
    InvalidBytecode { path: PathBuf, reason: String },

    #[error("{0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Proxy address the staking contract is reached through.
    pub address: Address,
    /// ABI of the implementation running before the upgrade.
    pub abi: AbiId,
    /// ABI of the implementation installed by the upgrade.
    pub upgraded_abi: AbiId,
    pub proxy_abi: AbiId,
    /// Hex file holding the new implementation's bytecode.
    pub implementation_bytecode: Option<PathBuf>,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SFC_ADDRESS,
            abi: AbiId::new("sfc-v1"),
            upgraded_abi: AbiId::new("sfc-v2"),
            proxy_abi: AbiId::new("upgradability-proxy"),
            implementation_bytecode: None,
        }
    }
}

/// The account that funds every other account and owns the contract.
#[derive(Debug, Clone, Deserialize)]
pub struct PayerConfig {
    pub address: Address,
    pub secret_key: SecretKey,
}

/// Amounts in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Amounts {
    /// Funding for each new staker account.
    pub staker_funding: Amount,
    pub stake: Amount,
    /// Funding for each new delegator account.
    pub delegator_funding: Amount,
    pub delegation: Amount,
    pub stake_increase: Amount,
    /// Funding for the temporary account used by the address round trip.
    pub address_swap_funding: Amount,
    /// `maxEpochs` argument to `claimValidatorRewards`.
    pub validator_reward_epochs: u64,
    /// `maxEpochs` argument to `claimDelegationRewards`.
    pub delegation_reward_epochs: u64,
}

impl Default for Amounts {
    fn default() -> Self {
        Self {
            staker_funding: Amount::new(6_350_000),
            stake: Amount::new(3_175_000),
            delegator_funding: Amount::new(3_175_000),
            delegation: Amount::new(2),
            stake_increase: Amount::new(2),
            address_swap_funding: Amount::new(1_000),
            validator_reward_epochs: 100,
            delegation_reward_epochs: 2,
        }
    }
}

/// Entity counts for the scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSizes {
    /// Stakers created before the upgrade.
    pub stakers: usize,
    /// Of those, how many are prepared to withdraw before the upgrade.
    pub stakers_to_prepare: usize,
    pub delegations_per_staker: usize,
    /// Epochs sealed after preparation before withdrawing.
    pub post_prepare_epochs: u64,
    /// Mark one remaining staker as a cheater and punish it after the
    /// upgrade.
    pub punish_cheater: bool,
}

impl Default for ScenarioSizes {
    fn default() -> Self {
        Self {
            stakers: 3,
            stakers_to_prepare: 1,
            delegations_per_staker: 1,
            post_prepare_epochs: 4,
            punish_cheater: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Blocks searched for the deployment's creation transaction.
    pub lookback_blocks: u64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            lookback_blocks: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// SuiteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub contract: ContractConfig,
    pub payer: Option<PayerConfig>,
    pub amounts: Amounts,
    pub scenario: ScenarioSizes,
    pub advancer: AdvancePolicy,
    pub waiter: WaitPolicy,
    pub upgrade: UpgradeConfig,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            endpoint: sfcv_client::config::DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 60,
            contract: ContractConfig::default(),
            payer: None,
            amounts: Amounts::default(),
            scenario: ScenarioSizes::default(),
            advancer: AdvancePolicy::default(),
            waiter: WaitPolicy::default(),
            upgrade: UpgradeConfig::default(),
        }
    }
}

impl SuiteConfig {
    /// Parse a YAML document. An empty document yields the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML file. Relative bytecode paths resolve against the file's
    /// directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw)?;
        if let (Some(bytecode), Some(dir)) =
            (config.contract.implementation_bytecode.as_mut(), path.parent())
        {
            if bytecode.is_relative() {
                *bytecode = dir.join(&*bytecode);
            }
        }
        Ok(config)
    }

    /// Load from `path` if given, else start from defaults, then apply
    /// `SFCV_*` environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_path(p)?,
            None => Self::default(),
        };
        let config = config.with_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides read through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(endpoint) = lookup("SFCV_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(raw) = lookup("SFCV_TIMEOUT_SECS") {
            self.timeout_secs = raw.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidOverride {
                    var: "SFCV_TIMEOUT_SECS",
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(raw) = lookup("SFCV_CONTRACT_ADDRESS") {
            self.contract.address = parse_address("SFCV_CONTRACT_ADDRESS", &raw)?;
        }

        let address = lookup("SFCV_PAYER_ADDRESS")
            .map(|raw| parse_address("SFCV_PAYER_ADDRESS", &raw))
            .transpose()?;
        let key = lookup("SFCV_PAYER_KEY").map(SecretKey::new);
        match (self.payer.as_mut(), address, key) {
            (Some(payer), address, key) => {
                if let Some(address) = address {
                    payer.address = address;
                }
                if let Some(key) = key {
                    payer.secret_key = key;
                }
            }
            (None, Some(address), Some(secret_key)) => {
                self.payer = Some(PayerConfig {
                    address,
                    secret_key,
                });
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(ConfigError::InvalidOverride {
                    var: "SFCV_PAYER_ADDRESS",
                    reason: "SFCV_PAYER_ADDRESS and SFCV_PAYER_KEY must be set together".into(),
                });
            }
            (None, None, None) => {}
        }
        Ok(self)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let s = &self.scenario;
        if s.stakers == 0 {
            errors.push("scenario.stakers must be > 0".to_string());
        }
        if s.stakers_to_prepare >= s.stakers {
            errors.push(format!(
                "scenario.stakers_to_prepare ({}) must be less than scenario.stakers ({})",
                s.stakers_to_prepare, s.stakers
            ));
        }
        if self.amounts.stake > self.amounts.staker_funding {
            errors.push("amounts.stake exceeds amounts.staker_funding".to_string());
        }
        if self.amounts.delegation > self.amounts.delegator_funding {
            errors.push("amounts.delegation exceeds amounts.delegator_funding".to_string());
        }
        if self.timeout_secs == 0 {
            errors.push("timeout_secs must be > 0".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }

    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        ClientConfig::parse(&self.endpoint, self.timeout_secs)
            .map_err(|e| ConfigError::InvalidEndpoint(self.endpoint.clone(), e.to_string()))
    }

    /// The payer as an account the suite can send from.
    pub fn payer_account(&self) -> Result<Account, ConfigError> {
        let payer = self.payer.as_ref().ok_or(ConfigError::MissingPayer)?;
        Ok(Account::new(
            payer.address,
            payer.secret_key.clone(),
            Amount::ZERO,
        ))
    }

    /// Read the new implementation's bytecode. The file holds hex text,
    /// optionally `0x`-prefixed; surrounding whitespace is ignored.
    pub fn bytecode(&self) -> Result<Vec<u8>, ConfigError> {
        let path = self
            .contract
            .implementation_bytecode
            .as_ref()
            .ok_or(ConfigError::MissingBytecode)?;
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        decode_hex(raw.trim()).map_err(|reason| ConfigError::InvalidBytecode {
            path: path.clone(),
            reason,
        })
    }
}

fn parse_address(var: &'static str, raw: &str) -> Result<Address, ConfigError> {
    raw.parse().map_err(|e: sfcv_core::ValidationError| ConfigError::InvalidOverride {
        var,
        reason: e.to_string(),
    })
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, String> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Err("empty".to_string());
    }
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("invalid hex at offset {i}"))
        })
        .collect()
}
