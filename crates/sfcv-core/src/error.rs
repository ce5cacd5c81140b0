//! # Error Types
//!
//! Validation failures raised when a chain primitive is parsed from its
//! textual or JSON form.

use thiserror::Error;

/// Error parsing or validating a domain primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Hex string lacked the `0x` prefix.
    #[error("{kind} must start with 0x: {value:?}")]
    MissingPrefix {
        /// Primitive being parsed ("address", "transaction hash").
        kind: &'static str,
        /// Offending input.
        value: String,
    },

    /// Hex payload had the wrong number of bytes.
    #[error("{kind} must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Primitive being parsed.
        kind: &'static str,
        /// Required byte length.
        expected: usize,
        /// Byte length found.
        actual: usize,
    },

    /// Hex payload contained a non-hex character.
    #[error("{kind} contains invalid hex: {value:?}")]
    InvalidHex {
        /// Primitive being parsed.
        kind: &'static str,
        /// Offending input.
        value: String,
    },

    /// Amount was not a base-10 unsigned integer.
    #[error("invalid amount {0:?}: expected a decimal integer")]
    InvalidAmount(String),

    /// A staker id of zero was supplied where a real staker is required.
    #[error("staker id must be non-zero")]
    ZeroStakerId,
}
