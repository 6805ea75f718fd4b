//! # rental-service: rental operations over a chain-query gateway.
//!
//! Wires derived accounts, coin selection and the assembler to a shared
//! [`ChainQuery`](rental_core::traits::ChainQuery), and tracks leases
//! through an explicit state machine gated on on-chain confirmation.
//!
//! # Modules
//!
//! - [`config`]: layered `Settings` and injected seed-phrase secrets
//! - [`error`]: `RentalError` and its stable `kind()` strings
//! - [`lease`]: `LeaseBook` and the Available / Locked / Released machine
//! - [`confirm`]: `ConfirmationPoller`
//! - [`service`]: `RentalService`

pub mod config;
pub mod confirm;
pub mod error;
pub mod lease;
pub mod service;

pub use config::{Secret, Seeds, Settings};
pub use confirm::{ConfirmationOutcome, ConfirmationPoller};
pub use error::RentalError;
pub use lease::{Lease, LeaseBook, LeaseState, PendingLock};
pub use service::{BalanceOutcome, LockReceipt, RentalService};
