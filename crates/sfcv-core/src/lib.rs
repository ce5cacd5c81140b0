//! # sfcv-core — Foundational Types for the SFC Upgrade Suite
//!
//! Defines the domain primitives every other crate in the workspace shares:
//! on-chain addresses, transaction hashes, token amounts, epochs, staker ids,
//! and funded accounts. It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtypes for chain primitives.** An [`Address`] cannot be passed where
//!    a [`TxHash`] is expected, and both validate their hex form at
//!    construction and deserialization time.
//!
//! 2. **Zero is not a staker.** The contract reports "no staker" as id `0`.
//!    [`StakerId`] is non-zero by construction; lookups return
//!    `Option<StakerId>` so the absent case must be handled explicitly.
//!
//! 3. **Amounts travel as decimal strings.** Base-unit amounts exceed the
//!    53-bit integer range of JSON consumers, so [`Amount`] serializes as a
//!    string.
//!
//! 4. **Secrets never reach logs.** [`Account`] holds its key in a
//!    `Zeroizing` buffer and redacts it from `Debug`.

pub mod account;
pub mod error;
pub mod primitives;

pub use account::{Account, SecretKey};
pub use error::ValidationError;
pub use primitives::{Address, Amount, Epoch, StakerId, TxHash};
