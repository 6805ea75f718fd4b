//! # rental-koios
//! [`ChainQuery`](rental_core::traits::ChainQuery) over the Koios REST API.
//!
//! One [`KoiosClient`] is built at process start and shared. Transient
//! failures (timeouts, 429, 5xx, transport errors) are retried with
//! exponential backoff and jitter; everything else fails immediately.

pub mod client;
pub mod models;

pub use client::{KoiosClient, RetryPolicy};
