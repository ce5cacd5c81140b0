//! Contract-call error types.

use std::fmt;

/// The bound ABI does not expose the requested method.
///
/// Expected when exercising an old contract with calls introduced by a newer
/// implementation (or vice versa). Callers decide per call site whether this
/// is a degraded-mode notice or a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompatibleMethod {
    /// Method that was called.
    pub method: String,
    /// ABI the call was bound to.
    pub abi: String,
}

impl fmt::Display for IncompatibleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method {} is not available on ABI {}", self.method, self.abi)
    }
}

impl std::error::Error for IncompatibleMethod {}

/// Errors from the contract-call collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Method missing from the bound ABI.
    #[error("incompatible contract: {0}")]
    Incompatible(IncompatibleMethod),

    /// The contract executed and rejected the call.
    #[error("{method} reverted: {reason}")]
    Reverted { method: String, reason: String },

    /// A referenced transaction, receipt, or contract does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// HTTP transport error.
    #[error("HTTP error calling {method}: {source}")]
    Transport {
        method: String,
        source: reqwest::Error,
    },

    /// The gateway answered with a JSON-RPC error this client does not map.
    #[error("RPC error from {method} (code {code}): {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// A result could not be decoded into the expected shape.
    #[error("failed to decode result of {method}: {reason}")]
    Decode { method: String, reason: String },
}

impl CallError {
    /// Build an [`CallError::Incompatible`] error.
    pub fn incompatible(method: impl Into<String>, abi: impl Into<String>) -> Self {
        Self::Incompatible(IncompatibleMethod {
            method: method.into(),
            abi: abi.into(),
        })
    }

    /// Build a [`CallError::Reverted`] error.
    pub fn reverted(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reverted {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Whether the contract rejected the call (as opposed to the transport
    /// or the binding failing).
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted { .. })
    }

    /// The incompatibility, if this error is one.
    pub fn as_incompatible(&self) -> Option<&IncompatibleMethod> {
        match self {
            Self::Incompatible(inner) => Some(inner),
            _ => None,
        }
    }
}
