// SPDX-License-Identifier: BUSL-1.1
//! JSON-RPC gateway routes for the simulator.
//!
//! Speaks the protocol `sfcv_client::HttpContractCaller` expects: a single
//! `POST /` endpoint taking JSON-RPC 2.0 requests, plus `GET /health`.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use sfcv_client::rpc::{CODE_EXECUTION_REVERTED, CODE_METHOD_NOT_IN_ABI, CODE_RESOURCE_NOT_FOUND};
use sfcv_client::{CallError, ContractRef};
use sfcv_core::{Account, Address, Amount, SecretKey, TxHash};

use crate::chain::SimulatedChain;

const CODE_METHOD_NOT_FOUND: i64 = -32601;
const CODE_INVALID_PARAMS: i64 = -32602;
const CODE_INTERNAL: i64 = -32603;

/// Build the gateway router.
pub fn router(chain: SimulatedChain) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", post(rpc))
        .with_state(chain)
}

/// Serve the gateway on `listener` until the process exits.
pub async fn serve(listener: TcpListener, chain: SimulatedChain) -> std::io::Result<()> {
    axum::serve(listener, router(chain).into_make_service()).await
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitParams {
    contract: ContractRef,
    method: String,
    #[serde(default)]
    args: Vec<Value>,
    from: Address,
    secret_key: String,
    #[serde(default)]
    value: Option<Amount>,
}

#[derive(Deserialize)]
struct ReadParams {
    contract: ContractRef,
    method: String,
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundParams {
    payer: Address,
    secret_key: String,
    amount: Amount,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployParams {
    from: Address,
    secret_key: String,
    bytecode: String,
}

/// A JSON-RPC error object ready to send.
struct RpcFailure {
    code: i64,
    message: String,
    data: Value,
}

impl RpcFailure {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }
}

impl From<CallError> for RpcFailure {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Incompatible(inner) => Self {
                code: CODE_METHOD_NOT_IN_ABI,
                message: inner.to_string(),
                data: json!({ "abi": inner.abi }),
            },
            CallError::Reverted { reason, .. } => Self::new(CODE_EXECUTION_REVERTED, reason),
            CallError::NotFound { what } => Self::new(CODE_RESOURCE_NOT_FOUND, what),
            CallError::Rpc { code, message, .. } => Self::new(code, message),
            other => Self::new(CODE_INTERNAL, other.to_string()),
        }
    }
}

fn first_param<T: DeserializeOwned>(params: &[Value]) -> Result<T, RpcFailure> {
    let raw = params
        .first()
        .cloned()
        .ok_or_else(|| RpcFailure::new(CODE_INVALID_PARAMS, "missing params"))?;
    serde_json::from_value(raw).map_err(|e| RpcFailure::new(CODE_INVALID_PARAMS, e.to_string()))
}

fn credentials(address: Address, secret: String) -> Account {
    Account::new(address, SecretKey::new(secret), Amount::ZERO)
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, RpcFailure> {
    let invalid = || RpcFailure::new(CODE_INVALID_PARAMS, format!("invalid hex bytecode {raw:?}"));
    let body = raw.strip_prefix("0x").ok_or_else(invalid)?;
    if body.len() % 2 != 0 {
        return Err(invalid());
    }
    body.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(invalid)
        })
        .collect()
}

fn dispatch(chain: &SimulatedChain, method: &str, params: &[Value]) -> Result<Value, RpcFailure> {
    match method {
        "sfc_submitContractCall" => {
            let p: SubmitParams = first_param(params)?;
            let sender = credentials(p.from, p.secret_key);
            let hash = chain.submit(&p.contract, &p.method, &p.args, &sender, p.value)?;
            Ok(json!(hash))
        }
        "sfc_readContractState" => {
            let p: ReadParams = first_param(params)?;
            Ok(chain.read(&p.contract, &p.method, &p.args)?)
        }
        "eth_getTransactionReceipt" => {
            let hash: TxHash = first_param(params)?;
            Ok(json!(chain.receipt(&hash)))
        }
        "sfc_mostRecentTransactions" => {
            let depth: u64 = first_param(params)?;
            Ok(json!(chain.recent_creations(depth)))
        }
        "sfc_fundAccount" => {
            let p: FundParams = first_param(params)?;
            let payer = credentials(p.payer, p.secret_key);
            let account = chain.fund(&payer, p.amount)?;
            Ok(json!({
                "address": account.address,
                "secretKey": account.secret_key.expose(),
                "balance": account.balance,
            }))
        }
        "sfc_deployContract" => {
            let p: DeployParams = first_param(params)?;
            let bytecode = decode_hex(&p.bytecode)?;
            let sender = credentials(p.from, p.secret_key);
            Ok(json!(chain.deploy(&sender, &bytecode)?))
        }
        other => Err(RpcFailure::new(
            CODE_METHOD_NOT_FOUND,
            format!("the method {other} does not exist"),
        )),
    }
}

async fn rpc(State(chain): State<SimulatedChain>, Json(req): Json<RpcRequest>) -> Json<Value> {
    tracing::debug!(method = %req.method, "gateway request");
    let body = match dispatch(&chain, &req.method, &req.params) {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": req.id, "result": result }),
        Err(failure) => json!({
            "jsonrpc": "2.0",
            "id": req.id,
            "error": {
                "code": failure.code,
                "message": failure.message,
                "data": failure.data,
            }
        }),
    };
    Json(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::chain::SFC_V2_BYTECODE;

    async fn call(app: &Router, method: &str, params: Value) -> Value {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::to_string(&json!({
                    "jsonrpc": "2.0",
                    "id": 7,
                    "method": method,
                    "params": params,
                }))
                .unwrap(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sfc_ref(abi: &str) -> Value {
        json!({ "abi": abi, "address": "0xfc00face00000000000000000000000000000000" })
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = router(SimulatedChain::default());
        let req = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn read_stakers_num() {
        let app = router(SimulatedChain::default());
        let resp = call(
            &app,
            "sfc_readContractState",
            json!([{ "contract": sfc_ref("sfc-v1"), "method": "stakersNum", "args": [] }]),
        )
        .await;
        assert_eq!(resp["id"], 7);
        assert_eq!(resp["result"], 0);
    }

    #[tokio::test]
    async fn incompatible_carries_abi_in_data() {
        let app = router(SimulatedChain::default());
        let resp = call(
            &app,
            "sfc_readContractState",
            json!([{ "contract": sfc_ref("sfc-v1"), "method": "getStakerID", "args": [] }]),
        )
        .await;
        assert_eq!(resp["error"]["code"], CODE_METHOD_NOT_IN_ABI);
        assert_eq!(resp["error"]["data"]["abi"], "sfc-v1");
    }

    #[tokio::test]
    async fn fund_returns_secret_and_submit_uses_it() {
        let chain = SimulatedChain::default();
        let payer = chain.payer();
        let app = router(chain.clone());

        let funded = call(
            &app,
            "sfc_fundAccount",
            json!([{
                "payer": payer.address,
                "secretKey": payer.secret_key.expose(),
                "amount": "6350000",
            }]),
        )
        .await;
        let account = &funded["result"];
        assert_eq!(account["balance"], "6350000");

        let submitted = call(
            &app,
            "sfc_submitContractCall",
            json!([{
                "contract": sfc_ref("sfc-v1"),
                "method": "createStake",
                "args": ["0x"],
                "from": account["address"],
                "secretKey": account["secretKey"],
                "value": "3175000",
            }]),
        )
        .await;
        assert!(submitted["result"].as_str().unwrap().starts_with("0x"));
        assert_eq!(chain.active_stakers(), 1);
    }

    #[tokio::test]
    async fn revert_maps_to_execution_reverted() {
        let chain = SimulatedChain::default();
        let payer = chain.payer();
        let app = router(chain);
        let resp = call(
            &app,
            "sfc_submitContractCall",
            json!([{
                "contract": sfc_ref("sfc-v1"),
                "method": "withdrawStake",
                "args": [],
                "from": payer.address,
                "secretKey": payer.secret_key.expose(),
            }]),
        )
        .await;
        assert_eq!(resp["error"]["code"], CODE_EXECUTION_REVERTED);
        assert_eq!(resp["error"]["message"], "staker doesn't exist");
    }

    #[tokio::test]
    async fn deploy_then_locate_by_receipt() {
        let chain = SimulatedChain::default();
        let payer = chain.payer();
        let app = router(chain);
        let hex: String = SFC_V2_BYTECODE.iter().map(|b| format!("{b:02x}")).collect();

        let deployed = call(
            &app,
            "sfc_deployContract",
            json!([{
                "from": payer.address,
                "secretKey": payer.secret_key.expose(),
                "bytecode": format!("0x{hex}"),
            }]),
        )
        .await;
        let hash = deployed["result"].clone();

        let recent = call(&app, "sfc_mostRecentTransactions", json!([100])).await;
        assert_eq!(recent["result"], json!([hash.clone()]));

        let receipt = call(&app, "eth_getTransactionReceipt", json!([hash])).await;
        assert_eq!(receipt["result"]["status"], "0x1");
        assert!(receipt["result"]["contractAddress"].is_string());
    }

    #[tokio::test]
    async fn unknown_receipt_is_null() {
        let app = router(SimulatedChain::default());
        let resp = call(
            &app,
            "eth_getTransactionReceipt",
            json!([format!("0x{}", "ab".repeat(32))]),
        )
        .await;
        assert!(resp["result"].is_null());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let app = router(SimulatedChain::default());
        let resp = call(&app, "eth_blockNumber", json!([])).await;
        assert_eq!(resp["error"]["code"], CODE_METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_params_are_invalid_params() {
        let app = router(SimulatedChain::default());
        let resp = call(&app, "sfc_mostRecentTransactions", json!(["many"])).await;
        assert_eq!(resp["error"]["code"], CODE_INVALID_PARAMS);
    }

    #[test]
    fn decode_hex_rejects_odd_and_unprefixed() {
        assert_eq!(decode_hex("0x6080").ok(), Some(vec![0x60, 0x80]));
        assert!(decode_hex("6080").is_err());
        assert!(decode_hex("0x608").is_err());
        assert!(decode_hex("0xzz").is_err());
    }
}
