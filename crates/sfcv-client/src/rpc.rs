//! JSON-RPC 2.0 client for a contract-call gateway.
//!
//! The gateway owns the contract ABIs and signs transactions on behalf of the
//! accounts it funded, so every submission carries the sender's secret key.
//! Point the client at a gateway you control.
//!
//! ## Error Mapping
//!
//! | JSON-RPC error code | [`CallError`] variant |
//! |---|---|
//! | `-32010` (method not in ABI) | `Incompatible` |
//! | `3` (execution reverted) | `Reverted` |
//! | `-32004` (resource not found) | `NotFound` |
//! | anything else | `Rpc` |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use sfcv_core::{Account, Amount, TxHash};

use crate::caller::{decode, ContractCaller, ContractRef, Receipt};
use crate::config::ClientConfig;
use crate::error::CallError;
use crate::retry::ReadRetry;

/// Gateway error code: the bound ABI has no such method.
pub const CODE_METHOD_NOT_IN_ABI: i64 = -32010;
/// Gateway error code: the contract reverted.
pub const CODE_EXECUTION_REVERTED: i64 = 3;
/// Gateway error code: referenced resource does not exist.
pub const CODE_RESOURCE_NOT_FOUND: i64 = -32004;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Contract-call collaborator backed by a JSON-RPC gateway.
#[derive(Debug, Clone)]
pub struct HttpContractCaller {
    http: reqwest::Client,
    endpoint: Url,
    next_id: Arc<AtomicU64>,
    retry: ReadRetry,
}

impl HttpContractCaller {
    /// Create a gateway client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self, CallError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CallError::Transport {
                method: "client_init".into(),
                source: e,
            })?;
        Ok(Self {
            http,
            endpoint: config.endpoint,
            next_id: Arc::new(AtomicU64::new(1)),
            retry: ReadRetry::default(),
        })
    }

    /// The gateway endpoint this client talks to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Issue one JSON-RPC request. `context` names the contract method (or
    /// the RPC method when there is none) for error reporting.
    async fn call(
        &self,
        rpc_method: &str,
        params: Value,
        context: &str,
        idempotent: bool,
    ) -> Result<Value, CallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": rpc_method,
            "params": params,
        });
        tracing::debug!(rpc_method, context, id, "gateway request");

        let send = || self.http.post(self.endpoint.clone()).json(&body).send();
        let sent = if idempotent {
            self.retry.send(rpc_method, send).await
        } else {
            send().await
        };
        let resp = sent.map_err(|e| CallError::Transport {
            method: rpc_method.to_string(),
            source: e,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CallError::Rpc {
                method: rpc_method.to_string(),
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        let parsed: RpcResponse = resp.json().await.map_err(|e| CallError::Decode {
            method: rpc_method.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(err) = parsed.error {
            return Err(map_rpc_error(err, context));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}

fn map_rpc_error(err: RpcErrorObject, context: &str) -> CallError {
    match err.code {
        CODE_METHOD_NOT_IN_ABI => {
            let abi = err
                .data
                .as_ref()
                .and_then(|d| d.get("abi"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            CallError::incompatible(context, abi)
        }
        CODE_EXECUTION_REVERTED => CallError::reverted(context, err.message),
        CODE_RESOURCE_NOT_FOUND => CallError::NotFound { what: err.message },
        code => CallError::Rpc {
            method: context.to_string(),
            code,
            message: err.message,
        },
    }
}

fn bytecode_hex(bytes: &[u8]) -> String {
    let body: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("0x{body}")
}

impl ContractCaller for HttpContractCaller {
    async fn submit_contract_call(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
        sender: &Account,
        value: Option<Amount>,
    ) -> Result<TxHash, CallError> {
        let params = json!([{
            "contract": contract,
            "method": method,
            "args": args,
            "from": sender.address,
            "secretKey": sender.secret_key.expose(),
            "value": value,
        }]);
        let result = self
            .call("sfc_submitContractCall", params, method, false)
            .await?;
        decode(method, result)
    }

    async fn read_contract_state(
        &self,
        contract: &ContractRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallError> {
        let params = json!([{
            "contract": contract,
            "method": method,
            "args": args,
        }]);
        self.call("sfc_readContractState", params, method, true).await
    }

    async fn get_transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, CallError> {
        let result = self
            .call(
                "eth_getTransactionReceipt",
                json!([hash]),
                "eth_getTransactionReceipt",
                true,
            )
            .await?;
        decode("eth_getTransactionReceipt", result)
    }

    async fn most_recent_transactions(&self, depth: u64) -> Result<Vec<TxHash>, CallError> {
        let result = self
            .call(
                "sfc_mostRecentTransactions",
                json!([depth]),
                "sfc_mostRecentTransactions",
                true,
            )
            .await?;
        decode("sfc_mostRecentTransactions", result)
    }

    async fn fund_account(&self, payer: &Account, amount: Amount) -> Result<Account, CallError> {
        let params = json!([{
            "payer": payer.address,
            "secretKey": payer.secret_key.expose(),
            "amount": amount,
        }]);
        let result = self
            .call("sfc_fundAccount", params, "sfc_fundAccount", false)
            .await?;
        decode("sfc_fundAccount", result)
    }

    async fn deploy_contract(
        &self,
        sender: &Account,
        bytecode: &[u8],
    ) -> Result<TxHash, CallError> {
        let params = json!([{
            "from": sender.address,
            "secretKey": sender.secret_key.expose(),
            "bytecode": bytecode_hex(bytecode),
        }]);
        let result = self
            .call("sfc_deployContract", params, "sfc_deployContract", false)
            .await?;
        decode("sfc_deployContract", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytecode_hex_is_prefixed_lowercase() {
        assert_eq!(bytecode_hex(&[0xAB, 0x01]), "0xab01");
        assert_eq!(bytecode_hex(&[]), "0x");
    }

    #[test]
    fn map_incompatible_uses_abi_from_data() {
        let err = map_rpc_error(
            RpcErrorObject {
                code: CODE_METHOD_NOT_IN_ABI,
                message: "method not in ABI".into(),
                data: Some(json!({"abi": "sfc-v1"})),
            },
            "getStakerID",
        );
        let inner = err.as_incompatible().unwrap();
        assert_eq!(inner.method, "getStakerID");
        assert_eq!(inner.abi, "sfc-v1");
    }

    #[test]
    fn map_unknown_code_is_rpc() {
        let err = map_rpc_error(
            RpcErrorObject {
                code: -32601,
                message: "the method sfc_fundAccount does not exist".into(),
                data: None,
            },
            "sfc_fundAccount",
        );
        assert!(matches!(err, CallError::Rpc { code: -32601, .. }));
    }
}
