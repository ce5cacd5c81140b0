// SPDX-License-Identifier: BUSL-1.1
//! # sfcv-stub — In-Memory SFC Simulator
//!
//! A single-process stand-in for a node running the staking contract behind
//! an upgradability proxy. It implements `sfcv_client::ContractCaller`
//! directly, so the lifecycle suite can run against it in tests, and serves
//! the JSON-RPC gateway protocol over HTTP for local runs of the `sfcv`
//! binary.
//!
//! ## Model
//!
//! - One block per mined transaction. Reverted calls are not mined.
//! - A logical clock that moves only when an epoch is sealed (or when a test
//!   calls [`SimulatedChain::advance_clock`]).
//! - Two implementation versions, [`ContractVersion::V1`] and
//!   [`ContractVersion::V2`], recognized by bytecode. Storage is shared
//!   across upgrades.
//! - Seal failures can be injected with [`SimulatedChain::fail_next_seals`].
//!
//! Data is lost on restart.

pub mod chain;
pub mod contract;
pub mod routes;

pub use chain::{
    address_for_secret, SimulatedChain, StubConfig, DEFAULT_PROXY_ADDRESS, SFC_V1_BYTECODE,
    SFC_V2_BYTECODE,
};
pub use contract::{ContractParams, ContractVersion, LockPeriods};
pub use routes::{router, serve};
