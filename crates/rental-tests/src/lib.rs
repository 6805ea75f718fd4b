//! Integration test suite for the NFT rental builder.
//!
//! Service flows run against an in-memory [`ChainQuery`](rental_core::traits::ChainQuery)
//! so no indexer is needed. Property tests exercise derivation, the address
//! codec and the selection/assembly invariants under randomized pools.

pub mod helpers;
