//! State threaded through a scenario's phases.

use serde::Serialize;

use crate::binding::ContractBinding;
use crate::registry::EntityRegistry;
use crate::txlog::TxLog;
use crate::upgrade::{MigrationOutcome, UpgradeOutcome};

/// A degraded-mode event that did not fail the run, such as a method the
/// bound contract does not expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub operation: String,
    pub message: String,
}

/// Everything one run has learned so far. Phases read and extend it; the
/// binding is replaced only by the upgrade phase.
#[derive(Debug, Clone)]
pub struct ScenarioState {
    pub registry: EntityRegistry,
    pub binding: ContractBinding,
    pub log: TxLog,
    /// Active staker count read before the run created anything.
    pub baseline_stakers: Option<u64>,
    pub upgrade: Option<UpgradeOutcome>,
    pub migration: Option<MigrationOutcome>,
    pub notices: Vec<Notice>,
}

impl ScenarioState {
    pub fn new(binding: ContractBinding) -> Self {
        Self {
            registry: EntityRegistry::new(),
            binding,
            log: TxLog::new(),
            baseline_stakers: None,
            upgrade: None,
            migration: None,
            notices: Vec::new(),
        }
    }

    /// Record a degraded-mode event.
    pub fn notice(&mut self, operation: impl Into<String>, message: impl ToString) {
        let notice = Notice {
            operation: operation.into(),
            message: message.to_string(),
        };
        tracing::warn!(operation = %notice.operation, message = %notice.message, "degraded mode");
        self.notices.push(notice);
    }
}
