//! Rental operations.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use rental_core::address::{Address, Network};
use rental_core::constants::LOVELACE_PER_ADA;
use rental_core::traits::ChainQuery;
use rental_core::types::{Asset, AssetId, Balance, TxHash};
use rental_wallet::{
    Account, ExtendedKeySigner, RandomImprove, SeedPhrase, SelectionStrategy, TransactionAssembler,
    TransactionBuilder, UnsignedTransaction,
};

use crate::config::{RentalSettings, Seeds, Settings};
use crate::confirm::{ConfirmationOutcome, ConfirmationPoller};
use crate::error::RentalError;
use crate::lease::{Lease, LeaseBook, LeaseState, PendingLock};

/// Result of a balance check. An account the indexer does not know is
/// `NoBalance`, distinct from a failed query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BalanceOutcome {
    Funded { stake_address: Address, lovelace: u64 },
    NoBalance { stake_address: Address },
}

impl BalanceOutcome {
    pub fn lovelace(&self) -> u64 {
        match self {
            BalanceOutcome::Funded { lovelace, .. } => *lovelace,
            BalanceOutcome::NoBalance { .. } => 0,
        }
    }

    /// Whole ADA, truncated.
    pub fn ada(&self) -> u64 {
        self.lovelace() / LOVELACE_PER_ADA
    }
}

/// A signed lock transaction, ready for submission.
#[derive(Debug, Clone, Serialize)]
pub struct LockReceipt {
    pub asset: AssetId,
    pub tx_hash: TxHash,
    /// Signed transaction CBOR, hex.
    pub tx_cbor_hex: String,
    pub fee: u64,
    pub ttl: u64,
    pub expiry_epoch: u64,
}

pub struct RentalService {
    gateway: Arc<dyn ChainQuery>,
    provider: Account,
    user: Account,
    strategy: Arc<dyn SelectionStrategy>,
    settings: RentalSettings,
    leases: LeaseBook,
}

impl RentalService {
    pub fn new(
        gateway: Arc<dyn ChainQuery>,
        provider: Account,
        user: Account,
        strategy: Arc<dyn SelectionStrategy>,
        settings: RentalSettings,
    ) -> Self {
        Self { gateway, provider, user, strategy, settings, leases: LeaseBook::new() }
    }

    /// Derive both accounts from injected seed phrases and use random-improve
    /// selection.
    pub fn from_seeds(gateway: Arc<dyn ChainQuery>, seeds: &Seeds, settings: &Settings) -> Result<Self, RentalError> {
        let provider = derive_account(seeds.provider.expose(), settings.network, settings.rental.account_index)?;
        let user = derive_account(seeds.user.expose(), settings.network, settings.rental.account_index)?;
        info!(
            network = %settings.network,
            provider = %provider.base_address(),
            user = %user.base_address(),
            "accounts derived"
        );
        Ok(Self::new(gateway, provider, user, Arc::new(RandomImprove::new()), settings.rental.clone()))
    }

    pub fn provider(&self) -> &Account {
        &self.provider
    }

    pub fn user(&self) -> &Account {
        &self.user
    }

    pub fn leases(&self) -> &LeaseBook {
        &self.leases
    }

    // ── Balances and assets ─────────────────────────────────────────────

    pub async fn check_provider_balance(&self) -> Result<BalanceOutcome, RentalError> {
        self.balance_of(&self.provider).await
    }

    pub async fn check_user_balance(&self) -> Result<BalanceOutcome, RentalError> {
        self.balance_of(&self.user).await
    }

    async fn balance_of(&self, account: &Account) -> Result<BalanceOutcome, RentalError> {
        let stake_address = account.stake_address().clone();
        let rows = self.gateway.account_balances(std::slice::from_ref(&stake_address)).await?;
        let mut matching = rows.iter().filter(|row| row.stake_address == stake_address).peekable();
        if matching.peek().is_none() {
            return Ok(BalanceOutcome::NoBalance { stake_address });
        }
        let lovelace = matching.fold(0u64, |acc, row| acc.saturating_add(row.total_balance));
        Ok(BalanceOutcome::Funded { stake_address, lovelace })
    }

    pub async fn provider_assets(&self) -> Result<Vec<Asset>, RentalError> {
        self.assets_of(&self.provider).await
    }

    pub async fn user_assets(&self) -> Result<Vec<Asset>, RentalError> {
        self.assets_of(&self.user).await
    }

    async fn assets_of(&self, account: &Account) -> Result<Vec<Asset>, RentalError> {
        let address = account.base_address().clone();
        let rows = self.gateway.address_assets(std::slice::from_ref(&address)).await?;
        Ok(rows.into_iter().filter(|row| row.address == address).map(|row| row.asset).collect())
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Build the unsigned transfer of one unit of `asset` plus the sale price
    /// from the user to the provider, with change back to the user.
    ///
    /// Protocol parameters and the tip are fetched for every build.
    #[instrument(skip(self, asset), fields(asset = %asset))]
    pub async fn build_nft_sale(&self, asset: &AssetId) -> Result<UnsignedTransaction, RentalError> {
        let user_address = self.user.base_address().clone();
        let (utxos, params, tip) = tokio::try_join!(
            self.gateway.address_utxos(std::slice::from_ref(&user_address)),
            self.gateway.protocol_parameters(),
            self.gateway.chain_tip(),
        )?;

        let mut builder = TransactionBuilder::new();
        builder
            .add_payment(
                self.provider.base_address().clone(),
                Balance::from_lovelace(self.settings.sale_price_lovelace).with_asset(asset.clone(), 1),
            )
            .set_ttl_horizon(self.settings.ttl_horizon_slots)
            .set_witness_count(self.settings.witness_count)
            .set_strategy(Arc::clone(&self.strategy));
        let unsigned = builder.build(&utxos, &user_address, &params, &tip)?;
        info!(
            fee = unsigned.fee(),
            inputs = unsigned.tx.body.inputs.len(),
            ttl = unsigned.tx.body.ttl,
            "nft sale built"
        );
        Ok(unsigned)
    }

    /// Build and sign the lock transaction for `asset` and record it as a
    /// pending lock. The lease becomes `Locked` only after
    /// [`RentalService::confirm_lock`] observes the transaction on chain.
    #[instrument(skip(self, asset), fields(asset = %asset))]
    pub async fn lock(&self, asset: &AssetId, expiry_epoch: u64) -> Result<LockReceipt, RentalError> {
        self.leases.can_lock(asset)?;
        let unsigned = self.build_nft_sale(asset).await?;

        let signer = ExtendedKeySigner::for_account(&self.user);
        let signed = TransactionAssembler::finalize(&unsigned, &signer, &unsigned.params)?;

        let tx_hash = signed.id()?;
        let ttl = signed.body.ttl;
        self.leases.begin_lock(
            asset,
            PendingLock { renter: self.user.base_address().clone(), expiry_epoch, tx_hash, ttl },
        )?;
        Ok(LockReceipt {
            asset: asset.clone(),
            tx_hash,
            tx_cbor_hex: hex::encode(signed.to_cbor()?),
            fee: signed.body.fee,
            ttl,
            expiry_epoch,
        })
    }

    /// Poll once for the pending lock of `asset`: lock the lease if the
    /// transaction is confirmed, abandon the pending lock if its TTL passed.
    pub async fn confirm_lock(&self, asset: &AssetId) -> Result<Lease, RentalError> {
        let pending = self.leases.pending(asset)?;
        match self.poller(1).check(&pending.tx_hash, pending.ttl).await? {
            Some(ConfirmationOutcome::Confirmed { .. }) => self.leases.confirm_lock(asset, &pending.tx_hash),
            Some(ConfirmationOutcome::Expired { tip_slot }) => {
                warn!(asset = %asset, tx = %pending.tx_hash, tip_slot, "lock expired unseen");
                self.leases.abandon_pending(asset)
            }
            None => self.lease(asset),
        }
    }

    /// Poll until the pending lock of `asset` is confirmed or expired.
    pub async fn await_lock(&self, asset: &AssetId) -> Result<Lease, RentalError> {
        let pending = self.leases.pending(asset)?;
        match self.poller(self.settings.max_polls).wait(&pending.tx_hash, pending.ttl).await? {
            ConfirmationOutcome::Confirmed { .. } => self.leases.confirm_lock(asset, &pending.tx_hash),
            ConfirmationOutcome::Expired { .. } => self.leases.abandon_pending(asset),
        }
    }

    pub fn release(&self, asset: &AssetId) -> Result<Lease, RentalError> {
        self.leases.release(asset)
    }

    pub fn relist(&self, asset: &AssetId) -> Result<Lease, RentalError> {
        self.leases.relist(asset)
    }

    pub fn lease(&self, asset: &AssetId) -> Result<Lease, RentalError> {
        self.leases.get(asset).ok_or_else(|| RentalError::NotFound(format!("lease {asset}")))
    }

    /// Release leases whose expiry epoch the chain tip has reached.
    pub async fn expire_leases(&self) -> Result<Vec<AssetId>, RentalError> {
        let tip = self.gateway.chain_tip().await?;
        Ok(self.leases.expire(tip.epoch))
    }

    /// Leases currently `Locked`.
    pub fn locked_leases(&self) -> Vec<Lease> {
        self.leases
            .snapshot()
            .into_iter()
            .filter(|l| matches!(l.state, LeaseState::Locked { .. }))
            .collect()
    }

    fn poller(&self, max_polls: u32) -> ConfirmationPoller {
        ConfirmationPoller::new(
            Arc::clone(&self.gateway),
            Duration::from_secs(self.settings.poll_interval_secs),
            max_polls,
            self.settings.required_confirmations,
        )
    }
}

fn derive_account(phrase: &str, network: Network, index: u32) -> Result<Account, RentalError> {
    let phrase = SeedPhrase::parse(phrase)?;
    Ok(Account::derive(&phrase, network, index)?)
}
