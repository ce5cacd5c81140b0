//! Error types for lifecycle orchestration.
//!
//! Each variant carries structured context. Contract incompatibility is
//! never swallowed here: it surfaces as [`CallError::Incompatible`] inside
//! [`LifecycleError::Call`] and the orchestrator decides per call site.

use thiserror::Error;

use sfcv_client::{CallError, IncompatibleMethod};
use sfcv_core::{Address, Epoch, TxHash};

use crate::registry::EntityPhase;

/// Registry misuse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No entity was registered under this handle.
    #[error("unknown handle {0}")]
    UnknownHandle(String),

    /// The requested lifecycle step does not follow from the entity's phase.
    #[error("{handle} cannot move from {from} to {to}")]
    InvalidTransition {
        handle: String,
        from: EntityPhase,
        to: EntityPhase,
    },
}

/// A client-side precondition that rejected an operation before submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("rewards have not been claimed")]
    RewardsNotClaimed,

    #[error("no epoch sealed since rewards were claimed at epoch {claimed_at} (current {current})")]
    NoEpochSinceClaim { claimed_at: Epoch, current: Epoch },

    #[error("already prepared to withdraw")]
    AlreadyPrepared,

    #[error("not prepared to withdraw")]
    NotPrepared,

    #[error("lock period not elapsed: {epochs_remaining} epochs and {secs_remaining}s remaining")]
    LockNotElapsed {
        epochs_remaining: u64,
        secs_remaining: u64,
    },

    #[error("already withdrawn")]
    AlreadyWithdrawn,

    #[error("not marked as a cheater")]
    NotACheater,
}

/// The epoch advancer gave up.
///
/// `advanced` reports partial progress: that many epochs were sealed before
/// the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("advanced {advanced} of {requested} epochs: {last_error}")]
pub struct CouldNotAdvance {
    pub requested: u64,
    pub advanced: u64,
    pub last_error: String,
}

/// Proxy upgrade failures. Any of these aborts the upgrade phase and
/// everything after it.
#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("no contract-creation transaction within the last {lookback} blocks")]
    NoCandidate { lookback: u64 },

    #[error("found {0} contract-creation transactions, expected exactly one")]
    AmbiguousCandidates(usize),

    #[error("most recent creation {found} is not the deployment {expected} submitted by this run")]
    UnknownDeployment { expected: TxHash, found: TxHash },

    #[error("no receipt for deployment {0}")]
    MissingReceipt(TxHash),

    #[error("receipt for {0} carries no contract address")]
    MissingContractAddress(TxHash),

    #[error("deployment {0} failed on chain")]
    DeploymentFailed(TxHash),

    #[error("proxy implementation is {actual}, expected {expected}")]
    ImplementationMismatch { expected: Address, actual: Address },

    #[error(transparent)]
    Call(#[from] CallError),
}

/// Top-level error for lifecycle operations and scenarios.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Call(#[from] CallError),

    /// A read-back or invariant check did not hold. Fatal for the scenario.
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    /// Rejected client-side; nothing was submitted and the registry is
    /// unchanged.
    #[error("{operation} rejected for {entity}: {reason}")]
    Rejected {
        operation: &'static str,
        entity: String,
        #[source]
        reason: PreconditionError,
    },

    #[error("lock on {entity} did not elapse within {max_wait_secs}s")]
    LockTimeout { entity: String, max_wait_secs: u64 },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Advance(#[from] CouldNotAdvance),

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),
}

impl LifecycleError {
    /// The incompatibility behind this error, if that is what it is.
    pub fn as_incompatible(&self) -> Option<&IncompatibleMethod> {
        match self {
            Self::Call(inner) => inner.as_incompatible(),
            Self::Upgrade(UpgradeError::Call(inner)) => inner.as_incompatible(),
            _ => None,
        }
    }

    /// The precondition that rejected the operation, if any.
    pub fn precondition(&self) -> Option<&PreconditionError> {
        match self {
            Self::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Build an [`LifecycleError::AssertionFailed`] unless `cond` holds.
pub(crate) fn ensure(cond: bool, message: impl FnOnce() -> String) -> Result<(), LifecycleError> {
    if cond {
        Ok(())
    } else {
        Err(LifecycleError::AssertionFailed(message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display_names_operation_and_reason() {
        let err = LifecycleError::Rejected {
            operation: "prepareToWithdrawStake",
            entity: "staker#0".into(),
            reason: PreconditionError::RewardsNotClaimed,
        };
        assert_eq!(
            err.to_string(),
            "prepareToWithdrawStake rejected for staker#0: rewards have not been claimed"
        );
        assert_eq!(err.precondition(), Some(&PreconditionError::RewardsNotClaimed));
    }

    #[test]
    fn incompatible_is_reachable_through_wrappers() {
        let direct = LifecycleError::from(CallError::incompatible("getStakerID", "sfc-v1"));
        assert_eq!(direct.as_incompatible().unwrap().method, "getStakerID");

        let nested = LifecycleError::from(UpgradeError::Call(CallError::incompatible(
            "upgradeTo",
            "upgradability-proxy",
        )));
        assert_eq!(nested.as_incompatible().unwrap().abi, "upgradability-proxy");

        let other = LifecycleError::AssertionFailed("x".into());
        assert!(other.as_incompatible().is_none());
    }

    #[test]
    fn could_not_advance_reports_progress() {
        let err = CouldNotAdvance {
            requested: 4,
            advanced: 1,
            last_error: "forceNewEpoch reverted: epoch is not sealable yet".into(),
        };
        assert!(err.to_string().starts_with("advanced 1 of 4 epochs"));
    }

    #[test]
    fn ensure_only_fails_when_false() {
        assert!(ensure(true, || unreachable!()).is_ok());
        let err = ensure(false, || "count mismatch".into()).unwrap_err();
        assert!(matches!(err, LifecycleError::AssertionFailed(ref m) if m == "count mismatch"));
    }
}
