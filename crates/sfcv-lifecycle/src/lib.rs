//! # sfcv-lifecycle — SFC Lifecycle Orchestration Across a Proxy Upgrade
//!
//! Drives stakers and delegations through their lifecycle on the staking
//! contract, upgrades the contract behind its proxy, and re-validates the
//! same entities against the new implementation.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator ──▶ Operations ──▶ ContractCaller ──▶ chain
//!      │              │  ├── EpochAdvancer
//!      │              │  └── LockWaiter
//!      │              ▼
//!      │        ScenarioState { EntityRegistry, ContractBinding, TxLog }
//!      └──▶ UpgradeCoordinator / StorageMigrator
//! ```
//!
//! - [`registry`]: every entity the run created, its id, and its phase.
//! - [`txlog`]: append-only transaction log for one run.
//! - [`binding`]: pre- and post-upgrade contract bindings, each with its own
//!   staker-id lookup.
//! - [`epoch`]: seals epochs with bounded retry.
//! - [`wait`]: polls until a withdrawal lock has elapsed.
//! - [`ops`]: the lifecycle operations and their bulk compositions.
//! - [`upgrade`]: proxy upgrade and storage migration.
//! - [`orchestrator`]: phased scenarios and the run report.
//! - [`config`]: YAML configuration with environment overrides.
//!
//! Execution is sequential: every contract call is awaited before the next
//! is issued, and the payer account is assumed to be used by this run only.

pub mod binding;
pub mod config;
pub mod epoch;
pub mod error;
pub mod ops;
pub mod orchestrator;
pub mod reads;
pub mod registry;
pub mod state;
pub mod txlog;
pub mod upgrade;
pub mod wait;

pub use binding::{BindingTarget, ContractBinding};
pub use config::{ConfigError, SuiteConfig};
pub use epoch::{AdvancePolicy, AdvanceReport, EpochAdvancer};
pub use error::{CouldNotAdvance, LifecycleError, PreconditionError, RegistryError, UpgradeError};
pub use ops::Operations;
pub use orchestrator::{Orchestrator, Phase, PhaseOutcome, PhaseStatus, RunReport, Scenario};
pub use reads::{DelegationInfo, LockPeriods, StakerInfo};
pub use registry::{
    DelegationHandle, EntityPhase, EntityRegistry, RegistrySnapshot, StakerHandle,
};
pub use state::{Notice, ScenarioState};
pub use txlog::{TransactionRecord, TxLog};
pub use upgrade::{MigrationOutcome, StorageMigrator, UpgradeCoordinator, UpgradeOutcome};
pub use wait::{Lock, LockStatus, LockWaiter, WaitPolicy};
