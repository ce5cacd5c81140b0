//! # sfcv-client -- Contract-Call Collaborator for the SFC Suite
//!
//! Everything the orchestration core needs from the outside world goes
//! through the [`ContractCaller`] trait: submitting contract calls, pure
//! reads, receipts, recent-transaction lookup, deployment, and funding fresh
//! accounts. ABI encoding, signing, and receipt polling live behind it.
//!
//! ## Implementations
//!
//! - [`HttpContractCaller`]: JSON-RPC 2.0 client for a contract-call gateway
//!   (a node-side service that owns the ABI and signs transactions).
//! - `sfcv_stub::SimulatedChain`: in-memory contract simulator used in tests
//!   and local runs.
//!
//! ## Gateway Method Convention
//!
//! | Trait method | JSON-RPC method |
//! |---|---|
//! | `submit_contract_call` | `sfc_submitContractCall` |
//! | `read_contract_state` | `sfc_readContractState` |
//! | `get_transaction_receipt` | `eth_getTransactionReceipt` |
//! | `most_recent_transactions` | `sfc_mostRecentTransactions` |
//! | `fund_account` | `sfc_fundAccount` |
//! | `deploy_contract` | `sfc_deployContract` |

pub mod caller;
pub mod config;
pub mod error;
pub(crate) mod retry;
pub mod rpc;

pub use caller::{decode, AbiId, ContractCaller, ContractRef, Receipt};
pub use config::{ClientConfig, ConfigError};
pub use error::{CallError, IncompatibleMethod};
pub use rpc::HttpContractCaller;
