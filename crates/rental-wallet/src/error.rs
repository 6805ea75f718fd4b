//! Wallet error types.

use rental_core::error::{AddressError, CryptoError, TransactionError};
use thiserror::Error;

/// Errors that can occur while deriving keys, selecting coins or
/// assembling a transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The seed phrase failed word-list or checksum validation. The reason
    /// never contains any part of the phrase.
    #[error("invalid seed phrase: {0}")]
    InvalidSeedPhrase(&'static str),

    /// Key derivation failure.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// The UTXO pool cannot cover the requested lovelace.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Lovelace available in the pool.
        have: u64,
        /// Lovelace required by outputs, change minimums and fee reserve.
        need: u64,
    },

    /// The UTXO pool cannot cover a requested native asset.
    #[error("insufficient {asset}: have {have}, need {need}")]
    InsufficientAsset {
        /// Asset unit (policy id ++ asset name, hex).
        asset: String,
        have: u64,
        need: u64,
    },

    /// A requested output carries less lovelace than the min-ADA rule allows.
    #[error("output {index} below minimum: has {have}, needs {need}")]
    OutputBelowMinimum { index: usize, have: u64, need: u64 },

    /// After paying the fee the designated change output is below min-ADA.
    #[error("change below minimum after fee {fee}: has {have}, needs {need}")]
    ChangeBelowMinimum { have: u64, need: u64, fee: u64 },

    /// No pure-ADA change output exists to absorb the fee.
    #[error("no change output to carry the fee")]
    NoChangeOutput,

    /// A pool entry is malformed (e.g. zero lovelace).
    #[error("invalid UTXO: {0}")]
    InvalidUtxo(String),

    /// The same outpoint appears twice in the pool.
    #[error("duplicate UTXO: {0}")]
    DuplicateUtxo(String),

    /// Fee estimation did not settle within the pass budget.
    #[error("fee did not converge after {passes} passes")]
    FeeDidNotConverge { passes: usize },

    /// The signed transaction needs a higher fee than the body carries.
    #[error("fee not covered: required {required}, body carries {fee}")]
    FeeNotCovered { required: u64, fee: u64 },

    /// Inputs do not equal outputs plus fee.
    #[error("conservation violated: {0}")]
    ConservationViolation(String),

    /// Serialized transaction exceeds the protocol limit.
    #[error("transaction too large: {size} > {max}")]
    TransactionTooLarge { size: usize, max: u64 },

    /// Transaction build error.
    #[error("build error: {0}")]
    BuildError(String),

    /// Witness stage failure.
    #[error("witness: {0}")]
    Witness(String),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}
