//! Per-run transaction log.
//!
//! Append-only: records are kept in submission order and are never
//! reordered, deduplicated, or removed. The upgrade coordinator reads the
//! latest deployment from it.

use serde::Serialize;

use sfcv_core::TxHash;

/// One submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub hash: TxHash,
    /// Contract method (or pseudo-operation such as `deploy`) that produced
    /// the transaction.
    pub operation: String,
}

/// Operation name recorded for contract deployments.
pub const DEPLOY_OPERATION: &str = "deploy";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TxLog {
    records: Vec<TransactionRecord>,
}

impl TxLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, hash: TxHash, operation: impl Into<String>) {
        let operation = operation.into();
        tracing::trace!(%hash, operation = %operation, "tx logged");
        self.records.push(TransactionRecord { hash, operation });
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TransactionRecord> {
        self.records.last()
    }

    /// Most recent record for `operation`.
    pub fn last_for(&self, operation: &str) -> Option<&TransactionRecord> {
        self.records.iter().rev().find(|r| r.operation == operation)
    }
}
