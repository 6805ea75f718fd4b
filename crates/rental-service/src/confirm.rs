//! Polling for on-chain confirmation of a submitted transaction.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use rental_core::error::GatewayError;
use rental_core::traits::ChainQuery;
use rental_core::types::TxHash;

use crate::error::RentalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Seen with at least the required depth.
    Confirmed { confirmations: u64 },
    /// The tip passed the transaction's TTL and it was never seen.
    Expired { tip_slot: u64 },
}

/// Polls `tx_status` and the chain tip at a fixed interval.
pub struct ConfirmationPoller {
    gateway: Arc<dyn ChainQuery>,
    interval: Duration,
    max_polls: u32,
    required: u64,
}

impl ConfirmationPoller {
    pub fn new(gateway: Arc<dyn ChainQuery>, interval: Duration, max_polls: u32, required: u64) -> Self {
        Self { gateway, interval, max_polls, required: required.max(1) }
    }

    /// One poll. `None` while the transaction is neither confirmed nor expired.
    pub async fn check(&self, tx_hash: &TxHash, ttl: u64) -> Result<Option<ConfirmationOutcome>, GatewayError> {
        let seen = self
            .gateway
            .tx_confirmations(std::slice::from_ref(tx_hash))
            .await?
            .into_iter()
            .find(|row| row.tx_hash == *tx_hash)
            .and_then(|row| row.confirmations);

        match seen {
            Some(n) if n >= self.required => return Ok(Some(ConfirmationOutcome::Confirmed { confirmations: n })),
            Some(n) if n > 0 => {
                debug!(tx = %tx_hash, confirmations = n, required = self.required, "awaiting depth");
                return Ok(None);
            }
            _ => {}
        }

        let tip = self.gateway.chain_tip().await?;
        if tip.abs_slot > ttl {
            return Ok(Some(ConfirmationOutcome::Expired { tip_slot: tip.abs_slot }));
        }
        debug!(tx = %tx_hash, tip = tip.abs_slot, ttl, "not yet seen");
        Ok(None)
    }

    /// Poll until confirmed or expired, at most `max_polls` times.
    pub async fn wait(&self, tx_hash: &TxHash, ttl: u64) -> Result<ConfirmationOutcome, RentalError> {
        for poll in 1..=self.max_polls {
            if let Some(outcome) = self.check(tx_hash, ttl).await? {
                return Ok(outcome);
            }
            if poll < self.max_polls {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(RentalError::ConfirmationTimeout { tx_hash: tx_hash.to_string(), polls: self.max_polls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rental_core::address::Address;
    use rental_core::types::{
        AccountBalance, AddressAsset, ChainTip, ProtocolParameters, TxConfirmation, Utxo,
    };

    /// Serves a scripted sequence of confirmation counts, one per poll.
    struct Scripted {
        confirmations: Mutex<Vec<Option<u64>>>,
        tip_slot: u64,
    }

    #[async_trait]
    impl ChainQuery for Scripted {
        async fn account_balances(&self, _: &[Address]) -> Result<Vec<AccountBalance>, GatewayError> {
            Ok(vec![])
        }
        async fn address_assets(&self, _: &[Address]) -> Result<Vec<AddressAsset>, GatewayError> {
            Ok(vec![])
        }
        async fn address_utxos(&self, _: &[Address]) -> Result<Vec<Utxo>, GatewayError> {
            Ok(vec![])
        }
        async fn protocol_parameters(&self) -> Result<ProtocolParameters, GatewayError> {
            Err(GatewayError::ProtocolParametersUnavailable("scripted".into()))
        }
        async fn chain_tip(&self) -> Result<ChainTip, GatewayError> {
            Ok(ChainTip { abs_slot: self.tip_slot, epoch: 1, block_height: 1 })
        }
        async fn tx_confirmations(&self, hashes: &[TxHash]) -> Result<Vec<TxConfirmation>, GatewayError> {
            let mut script = self.confirmations.lock();
            let next = if script.len() > 1 { script.remove(0) } else { script[0] };
            Ok(vec![TxConfirmation { tx_hash: hashes[0], confirmations: next }])
        }
    }

    fn poller(script: Vec<Option<u64>>, tip_slot: u64, max_polls: u32, required: u64) -> ConfirmationPoller {
        let gw = Arc::new(Scripted { confirmations: Mutex::new(script), tip_slot });
        ConfirmationPoller::new(gw, Duration::from_millis(1), max_polls, required)
    }

    #[tokio::test]
    async fn confirmed_after_a_few_polls() {
        let p = poller(vec![None, Some(1), Some(2)], 100, 10, 2);
        let outcome = p.wait(&TxHash([1; 32]), 1_000).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Confirmed { confirmations: 2 });
    }

    #[tokio::test]
    async fn expired_when_tip_passes_ttl_unseen() {
        let p = poller(vec![None], 5_000, 10, 1);
        let outcome = p.wait(&TxHash([1; 32]), 1_000).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Expired { tip_slot: 5_000 });
    }

    #[tokio::test]
    async fn seen_but_shallow_is_not_expired() {
        let p = poller(vec![Some(1)], 5_000, 3, 5);
        assert_eq!(p.check(&TxHash([1; 32]), 1_000).await.unwrap(), None);
    }

    #[tokio::test]
    async fn times_out_after_max_polls() {
        let p = poller(vec![None], 100, 3, 1);
        let err = p.wait(&TxHash([2; 32]), 1_000).await.unwrap_err();
        assert_eq!(err, RentalError::ConfirmationTimeout { tx_hash: TxHash([2; 32]).to_string(), polls: 3 });
    }
}
