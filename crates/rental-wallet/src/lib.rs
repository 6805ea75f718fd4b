//! # rental-wallet: HD keys, coin selection and transaction assembly.
//!
//! Derives CIP-1852 accounts from a BIP-39 seed phrase, selects inputs with
//! the random-improve heuristic, and assembles a fee-converged transaction
//! body that a [`WitnessStage`] signs.
//!
//! # Modules
//!
//! - [`error`]: `WalletError` enum
//! - [`mnemonic`]: validated, zeroized seed phrases
//! - [`keys`]: BIP32-Ed25519 derivation, `KeyNode`, `Account`
//! - [`coin_selection`]: `SelectionStrategy`, `RandomImprove`, `LargestFirst`
//! - [`builder`]: `TransactionAssembler` and `TransactionBuilder`
//! - [`witness`]: `WitnessStage` and the extended-key signer

pub mod builder;
pub mod coin_selection;
pub mod error;
pub mod keys;
pub mod mnemonic;
pub mod witness;

// Re-exports for convenient access
pub use builder::{TransactionAssembler, TransactionBuilder, UnsignedTransaction};
pub use coin_selection::{CoinSelection, LargestFirst, RandomImprove, SelectionRequest, SelectionStrategy};
pub use error::WalletError;
pub use keys::{derive, Account, DerivationPath, KeyNode, Role};
pub use mnemonic::SeedPhrase;
pub use witness::{ExtendedKeySigner, WitnessStage};
