//! The contract-call collaborator trait and its wire types.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sfcv_core::{Account, Address, Amount, TxHash};

use crate::error::CallError;

/// Name of an ABI known to the collaborator (e.g. `"sfc-v1"`,
/// `"upgradability-proxy"`). The collaborator owns the ABI JSON; the suite
/// only refers to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbiId(String);

impl AbiId {
    /// Create an ABI reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The ABI name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AbiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ABI bound to an address: the unit every contract call targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRef {
    pub abi: AbiId,
    pub address: Address,
}

impl ContractRef {
    pub fn new(abi: AbiId, address: Address) -> Self {
        Self { abi, address }
    }
}

/// Transaction receipt, reduced to the fields the suite inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: TxHash,
    /// Address of the contract created by this transaction, if any.
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// Execution status: `true` on success.
    #[serde(with = "status_flag")]
    pub status: bool,
}

/// Receipt status travels as `"0x1"` / `"0x0"` on Ethereum-style RPC.
mod status_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ok: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(if *ok { "0x1" } else { "0x0" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Hex(String),
        }
        match Raw::deserialize(d)? {
            Raw::Flag(ok) => Ok(ok),
            Raw::Hex(s) => match s.as_str() {
                "0x1" | "0x01" => Ok(true),
                "0x0" | "0x00" => Ok(false),
                other => Err(serde::de::Error::custom(format!(
                    "invalid receipt status {other:?}"
                ))),
            },
        }
    }
}

/// The contract-call collaborator.
///
/// Every method is a suspension point; the suite awaits each call to
/// completion before issuing the next. Implementations must report a missing
/// method as [`CallError::Incompatible`] and a contract-level rejection as
/// [`CallError::Reverted`] so the orchestrator can tell them apart.
#[allow(async_fn_in_trait)]
pub trait ContractCaller {
    /// Submit a state-changing call and wait until it is mined.
    async fn submit_contract_call(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
        sender: &Account,
        value: Option<Amount>,
    ) -> Result<TxHash, CallError>;

    /// Pure read of contract state.
    async fn read_contract_state(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallError>;

    /// Fetch a receipt; `None` if the transaction is unknown.
    async fn get_transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, CallError>;

    /// Contract-creation transactions mined within the last `depth` blocks,
    /// most recent first.
    async fn most_recent_transactions(&self, depth: u64) -> Result<Vec<TxHash>, CallError>;

    /// Create a fresh keypair funded with `amount` from `payer`.
    async fn fund_account(&self, payer: &Account, amount: Amount) -> Result<Account, CallError>;

    /// Deploy contract bytecode and wait until it is mined.
    async fn deploy_contract(&self, sender: &Account, bytecode: &[u8])
        -> Result<TxHash, CallError>;
}

/// Decode a read result into a typed view.
pub fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, CallError> {
    serde_json::from_value(value).map_err(|e| CallError::Decode {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_accepts_hex_status() {
        let receipt: Receipt = serde_json::from_value(serde_json::json!({
            "transactionHash": format!("0x{}", "11".repeat(32)),
            "contractAddress": "0x00000000000000000000000000000000000000c1",
            "status": "0x1"
        }))
        .unwrap();
        assert!(receipt.status);
        assert!(receipt.contract_address.is_some());
    }

    #[test]
    fn receipt_without_contract_address() {
        let receipt: Receipt = serde_json::from_value(serde_json::json!({
            "transactionHash": format!("0x{}", "22".repeat(32)),
            "contractAddress": null,
            "status": false
        }))
        .unwrap();
        assert!(!receipt.status);
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn receipt_rejects_unknown_status() {
        let result: Result<Receipt, _> = serde_json::from_value(serde_json::json!({
            "transactionHash": format!("0x{}", "33".repeat(32)),
            "status": "pending"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn decode_reports_method_on_failure() {
        let err = decode::<u64>("stakersNum", serde_json::json!("not a number")).unwrap_err();
        assert!(matches!(err, CallError::Decode { ref method, .. } if method == "stakersNum"));
    }
}
