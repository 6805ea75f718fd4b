//! # rental-core
//! Ledger types, the Shelley address codec, wire encoding and the
//! chain-query gateway trait shared by the NFT rental crates.

pub mod address;
pub mod cbor;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod traits;
pub mod types;
