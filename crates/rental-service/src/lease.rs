//! Lease state machine.
//!
//! ```text
//!   Available ──begin_lock──▶ Available + pending ──confirm_lock──▶ Locked
//!       ▲                            │                                │
//!       │                     abandon_pending               release / expire
//!       │                            ▼                                ▼
//!       └──────────── relist ─────────────────────────────────── Released
//! ```
//!
//! A lease only becomes `Locked` once its lock transaction has been seen on
//! chain; submitting it is not enough. The book is shared across request
//! handlers behind a `parking_lot::RwLock`.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use rental_core::address::Address;
use rental_core::types::{AssetId, TxHash};

use crate::error::RentalError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LeaseState {
    Available,
    Locked { renter: Address, expiry_epoch: u64 },
    Released,
}

impl LeaseState {
    pub fn name(&self) -> &'static str {
        match self {
            LeaseState::Available => "available",
            LeaseState::Locked { .. } => "locked",
            LeaseState::Released => "released",
        }
    }
}

/// A lock transaction built and signed but not yet observed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingLock {
    pub renter: Address,
    pub expiry_epoch: u64,
    pub tx_hash: TxHash,
    /// Slot after which the transaction can no longer land.
    pub ttl: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lease {
    pub asset: AssetId,
    #[serde(flatten)]
    pub state: LeaseState,
    pub pending: Option<PendingLock>,
    /// Transaction that moved the lease into `Locked`.
    pub lock_tx: Option<TxHash>,
}

impl Lease {
    fn available(asset: AssetId) -> Self {
        Self { asset, state: LeaseState::Available, pending: None, lock_tx: None }
    }

    fn invalid(&self, action: &'static str) -> RentalError {
        let state = if self.pending.is_some() { "pending" } else { self.state.name() };
        RentalError::InvalidTransition { asset: self.asset.to_string(), state, action }
    }
}

/// Registry of leases keyed by asset.
#[derive(Debug, Default)]
pub struct LeaseBook {
    leases: RwLock<HashMap<AssetId, Lease>>,
}

impl LeaseBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, asset: &AssetId) -> Option<Lease> {
        self.leases.read().get(asset).cloned()
    }

    /// All leases, ordered by asset.
    pub fn snapshot(&self) -> Vec<Lease> {
        let mut all: Vec<Lease> = self.leases.read().values().cloned().collect();
        all.sort_by(|a, b| a.asset.cmp(&b.asset));
        all
    }

    /// Whether `begin_lock` would currently be accepted.
    pub fn can_lock(&self, asset: &AssetId) -> Result<(), RentalError> {
        match self.leases.read().get(asset) {
            None => Ok(()),
            Some(lease) if lease.state == LeaseState::Available && lease.pending.is_none() => Ok(()),
            Some(lease) => Err(lease.invalid("lock")),
        }
    }

    /// Record a signed lock transaction. Unknown assets are listed as
    /// available first.
    pub fn begin_lock(&self, asset: &AssetId, pending: PendingLock) -> Result<(), RentalError> {
        let mut leases = self.leases.write();
        let lease = leases.entry(asset.clone()).or_insert_with(|| Lease::available(asset.clone()));
        if lease.state != LeaseState::Available || lease.pending.is_some() {
            return Err(lease.invalid("lock"));
        }
        info!(asset = %asset, tx = %pending.tx_hash, ttl = pending.ttl, "lock pending confirmation");
        lease.pending = Some(pending);
        Ok(())
    }

    /// The pending lock of `asset`, if any.
    pub fn pending(&self, asset: &AssetId) -> Result<PendingLock, RentalError> {
        let leases = self.leases.read();
        let lease = leases.get(asset).ok_or_else(|| RentalError::NotFound(format!("lease {asset}")))?;
        lease.pending.clone().ok_or_else(|| RentalError::NotFound(format!("pending lock for {asset}")))
    }

    /// Move to `Locked` once the pending transaction `tx_hash` is observed.
    pub fn confirm_lock(&self, asset: &AssetId, tx_hash: &TxHash) -> Result<Lease, RentalError> {
        let mut leases = self.leases.write();
        let lease = leases.get_mut(asset).ok_or_else(|| RentalError::NotFound(format!("lease {asset}")))?;
        match &lease.pending {
            Some(p) if p.tx_hash == *tx_hash => {
                lease.state = LeaseState::Locked { renter: p.renter.clone(), expiry_epoch: p.expiry_epoch };
                lease.lock_tx = Some(p.tx_hash);
                lease.pending = None;
                info!(asset = %asset, tx = %tx_hash, "lease locked");
                Ok(lease.clone())
            }
            Some(_) => Err(RentalError::NotFound(format!("pending lock {tx_hash} for {asset}"))),
            None => Err(lease.invalid("confirm")),
        }
    }

    /// Drop a pending lock whose transaction can no longer land.
    pub fn abandon_pending(&self, asset: &AssetId) -> Result<Lease, RentalError> {
        let mut leases = self.leases.write();
        let lease = leases.get_mut(asset).ok_or_else(|| RentalError::NotFound(format!("lease {asset}")))?;
        let Some(pending) = lease.pending.take() else {
            return Err(lease.invalid("abandon"));
        };
        info!(asset = %asset, tx = %pending.tx_hash, "pending lock abandoned");
        Ok(lease.clone())
    }

    /// Explicit release of a locked lease.
    pub fn release(&self, asset: &AssetId) -> Result<Lease, RentalError> {
        let mut leases = self.leases.write();
        let lease = leases.get_mut(asset).ok_or_else(|| RentalError::NotFound(format!("lease {asset}")))?;
        if !matches!(lease.state, LeaseState::Locked { .. }) {
            return Err(lease.invalid("release"));
        }
        lease.state = LeaseState::Released;
        info!(asset = %asset, "lease released");
        Ok(lease.clone())
    }

    /// Release every locked lease whose expiry epoch has been reached.
    pub fn expire(&self, current_epoch: u64) -> Vec<AssetId> {
        let mut leases = self.leases.write();
        let mut expired = Vec::new();
        for lease in leases.values_mut() {
            if let LeaseState::Locked { expiry_epoch, .. } = lease.state {
                if expiry_epoch <= current_epoch {
                    lease.state = LeaseState::Released;
                    expired.push(lease.asset.clone());
                }
            }
        }
        expired.sort();
        if !expired.is_empty() {
            info!(count = expired.len(), epoch = current_epoch, "leases expired");
        }
        expired
    }

    /// Make a released lease available again.
    pub fn relist(&self, asset: &AssetId) -> Result<Lease, RentalError> {
        let mut leases = self.leases.write();
        let lease = leases.get_mut(asset).ok_or_else(|| RentalError::NotFound(format!("lease {asset}")))?;
        if lease.state != LeaseState::Released {
            return Err(lease.invalid("relist"));
        }
        lease.state = LeaseState::Available;
        lease.lock_tx = None;
        Ok(lease.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rental_core::address::NetworkId;
    use rental_core::types::{AssetName, KeyHash, PolicyId};

    fn asset(tag: u8) -> AssetId {
        AssetId::new(PolicyId([tag; 28]), AssetName::new(vec![tag]).unwrap())
    }

    fn renter() -> Address {
        Address::Base { network: NetworkId::Testnet, payment: KeyHash([1; 28]), stake: KeyHash([2; 28]) }
    }

    fn pending(tx: u8, expiry_epoch: u64) -> PendingLock {
        PendingLock { renter: renter(), expiry_epoch, tx_hash: TxHash([tx; 32]), ttl: 1_000 }
    }

    fn locked_book(expiry_epoch: u64) -> LeaseBook {
        let book = LeaseBook::new();
        book.begin_lock(&asset(1), pending(9, expiry_epoch)).unwrap();
        book.confirm_lock(&asset(1), &TxHash([9; 32])).unwrap();
        book
    }

    #[test]
    fn lock_requires_confirmation() {
        let book = LeaseBook::new();
        book.begin_lock(&asset(1), pending(9, 200)).unwrap();
        let lease = book.get(&asset(1)).unwrap();
        assert_eq!(lease.state, LeaseState::Available);
        assert!(lease.pending.is_some());

        let lease = book.confirm_lock(&asset(1), &TxHash([9; 32])).unwrap();
        assert_eq!(lease.state, LeaseState::Locked { renter: renter(), expiry_epoch: 200 });
        assert_eq!(lease.lock_tx, Some(TxHash([9; 32])));
        assert!(lease.pending.is_none());
    }

    #[test]
    fn second_lock_while_pending_rejected() {
        let book = LeaseBook::new();
        book.begin_lock(&asset(1), pending(9, 200)).unwrap();
        let err = book.begin_lock(&asset(1), pending(8, 200)).unwrap_err();
        assert_eq!(err, RentalError::InvalidTransition { asset: asset(1).to_string(), state: "pending", action: "lock" });
        assert!(book.can_lock(&asset(1)).is_err());
    }

    #[test]
    fn confirm_with_other_tx_not_found() {
        let book = LeaseBook::new();
        book.begin_lock(&asset(1), pending(9, 200)).unwrap();
        assert!(matches!(book.confirm_lock(&asset(1), &TxHash([7; 32])), Err(RentalError::NotFound(_))));
    }

    #[test]
    fn abandon_returns_to_available() {
        let book = LeaseBook::new();
        book.begin_lock(&asset(1), pending(9, 200)).unwrap();
        let lease = book.abandon_pending(&asset(1)).unwrap();
        assert_eq!(lease.state, LeaseState::Available);
        assert!(lease.pending.is_none());
        book.can_lock(&asset(1)).unwrap();
    }

    #[test]
    fn release_only_from_locked() {
        let book = LeaseBook::new();
        book.begin_lock(&asset(1), pending(9, 200)).unwrap();
        assert_eq!(book.release(&asset(1)).unwrap_err().kind(), "invalid_transition");

        let book = locked_book(200);
        assert_eq!(book.release(&asset(1)).unwrap().state, LeaseState::Released);
        assert_eq!(book.release(&asset(1)).unwrap_err().kind(), "invalid_transition");
    }

    #[test]
    fn expiry_by_epoch() {
        let book = locked_book(150);
        assert!(book.expire(149).is_empty());
        assert_eq!(book.expire(150), vec![asset(1)]);
        assert_eq!(book.get(&asset(1)).unwrap().state, LeaseState::Released);
        assert!(book.expire(151).is_empty());
    }

    #[test]
    fn relist_after_release() {
        let book = locked_book(150);
        assert_eq!(book.relist(&asset(1)).unwrap_err().kind(), "invalid_transition");
        book.release(&asset(1)).unwrap();
        let lease = book.relist(&asset(1)).unwrap();
        assert_eq!(lease.state, LeaseState::Available);
        assert_eq!(lease.lock_tx, None);
        book.begin_lock(&asset(1), pending(3, 300)).unwrap();
    }

    #[test]
    fn unknown_asset_not_found() {
        let book = LeaseBook::new();
        assert_eq!(book.release(&asset(5)).unwrap_err().kind(), "not_found");
        assert_eq!(book.pending(&asset(5)).unwrap_err().kind(), "not_found");
        assert!(book.get(&asset(5)).is_none());
    }

    #[test]
    fn snapshot_sorted() {
        let book = LeaseBook::new();
        book.begin_lock(&asset(3), pending(3, 10)).unwrap();
        book.begin_lock(&asset(1), pending(1, 10)).unwrap();
        let assets: Vec<_> = book.snapshot().into_iter().map(|l| l.asset).collect();
        assert_eq!(assets, vec![asset(1), asset(3)]);
    }

    #[test]
    fn lease_serializes_with_state_tag() {
        let book = locked_book(150);
        let json = serde_json::to_value(book.get(&asset(1)).unwrap()).unwrap();
        assert_eq!(json["state"], "locked");
        assert_eq!(json["expiry_epoch"], 150);
    }
}
