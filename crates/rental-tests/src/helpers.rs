//! Shared test helpers: an in-memory chain and fixture accounts.

use async_trait::async_trait;
use bip39::{Language, Mnemonic};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use rental_core::address::{Address, Network};
use rental_core::error::GatewayError;
use rental_core::traits::ChainQuery;
use rental_core::types::{
    AccountBalance, AddressAsset, Asset, AssetId, AssetName, Balance, ChainTip, OutPoint, PolicyId,
    ProtocolParameters, TxConfirmation, TxHash, Utxo,
};
use rental_service::config::{RentalSettings, Secret, Seeds, Settings};
use rental_service::RentalService;
use rental_wallet::{Account, RandomImprove, SeedPhrase};

/// Preprod-like fee parameters.
pub fn preprod_params() -> ProtocolParameters {
    ProtocolParameters { min_fee_a: 44, min_fee_b: 155_381, coins_per_utxo_byte: 4_310, max_tx_size: 16_384 }
}

pub fn tip(abs_slot: u64, epoch: u64) -> ChainTip {
    ChainTip { abs_slot, epoch, block_height: abs_slot / 20 }
}

/// A valid 12-word phrase built from repeated entropy bytes.
pub fn fixture_phrase(tag: u8) -> String {
    Mnemonic::from_entropy_in(Language::English, &[tag; 16])
        .expect("16 bytes is valid BIP-39 entropy")
        .to_string()
}

pub fn fixture_account(tag: u8, network: Network) -> Account {
    let phrase = SeedPhrase::parse(&fixture_phrase(tag)).expect("fixture phrase parses");
    Account::derive(&phrase, network, 0).expect("fixture account derives")
}

pub const PROVIDER_TAG: u8 = 0x11;
pub const USER_TAG: u8 = 0x22;

pub fn fixture_seeds() -> Seeds {
    Seeds {
        provider: Secret::new(fixture_phrase(PROVIDER_TAG)),
        user: Secret::new(fixture_phrase(USER_TAG)),
    }
}

pub fn nft(name: &str) -> AssetId {
    AssetId::new(PolicyId([0x5a; 28]), AssetName::new(name.as_bytes().to_vec()).expect("short name"))
}

pub fn utxo(seq: u32, balance: Balance) -> Utxo {
    let mut hash = [0u8; 32];
    hash[..4].copy_from_slice(&seq.to_be_bytes());
    Utxo { outpoint: OutPoint { tx_hash: TxHash(hash), index: seq % 4 }, balance }
}

pub fn ada_utxo(seq: u32, lovelace: u64) -> Utxo {
    utxo(seq, Balance::from_lovelace(lovelace))
}

/// Settings for service tests: preprod, no polling delay.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.rental = RentalSettings { poll_interval_secs: 0, max_polls: 3, ..RentalSettings::default() };
    settings
}

/// A service over `chain` with the fixture accounts and seeded selection.
pub fn test_service(chain: Arc<MemoryChain>) -> RentalService {
    let settings = test_settings();
    let provider = fixture_account(PROVIDER_TAG, settings.network);
    let user = fixture_account(USER_TAG, settings.network);
    RentalService::new(chain, provider, user, Arc::new(RandomImprove::seeded(7)), settings.rental)
}

// ---------------------------------------------------------------------------
// MemoryChain
// ---------------------------------------------------------------------------

/// In-memory [`ChainQuery`]. Every call fails with the configured error
/// while one is set.
pub struct MemoryChain {
    utxos: RwLock<HashMap<Address, Vec<Utxo>>>,
    balances: RwLock<HashMap<Address, u64>>,
    assets: RwLock<Vec<AddressAsset>>,
    params: RwLock<Option<ProtocolParameters>>,
    tip: RwLock<ChainTip>,
    confirmations: RwLock<HashMap<TxHash, u64>>,
    failure: RwLock<Option<GatewayError>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self {
            utxos: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            assets: RwLock::new(Vec::new()),
            params: RwLock::new(Some(preprod_params())),
            tip: RwLock::new(tip(60_000_000, 150)),
            confirmations: RwLock::new(HashMap::new()),
            failure: RwLock::new(None),
        }
    }

    /// Add `utxo` at `address`, indexing any assets it carries.
    pub fn fund(&self, address: &Address, utxo: Utxo) {
        for (id, quantity) in utxo.balance.assets() {
            self.assets.write().push(AddressAsset {
                address: address.clone(),
                asset: Asset { policy_id: id.policy_id, name: id.name.clone(), quantity },
            });
        }
        self.utxos.write().entry(address.clone()).or_default().push(utxo);
    }

    pub fn set_account_balance(&self, stake_address: &Address, lovelace: u64) {
        self.balances.write().insert(stake_address.clone(), lovelace);
    }

    pub fn set_params(&self, params: Option<ProtocolParameters>) {
        *self.params.write() = params;
    }

    pub fn set_tip(&self, abs_slot: u64, epoch: u64) {
        *self.tip.write() = tip(abs_slot, epoch);
    }

    pub fn current_tip(&self) -> ChainTip {
        *self.tip.read()
    }

    pub fn confirm(&self, tx_hash: TxHash, confirmations: u64) {
        self.confirmations.write().insert(tx_hash, confirmations);
    }

    pub fn fail_with(&self, error: Option<GatewayError>) {
        *self.failure.write() = error;
    }

    fn check(&self) -> Result<(), GatewayError> {
        match self.failure.read().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainQuery for MemoryChain {
    async fn account_balances(&self, stake_addresses: &[Address]) -> Result<Vec<AccountBalance>, GatewayError> {
        self.check()?;
        let balances = self.balances.read();
        Ok(stake_addresses
            .iter()
            .filter_map(|a| {
                balances.get(a).map(|&total_balance| AccountBalance { stake_address: a.clone(), total_balance })
            })
            .collect())
    }

    async fn address_assets(&self, addresses: &[Address]) -> Result<Vec<AddressAsset>, GatewayError> {
        self.check()?;
        Ok(self.assets.read().iter().filter(|row| addresses.contains(&row.address)).cloned().collect())
    }

    async fn address_utxos(&self, addresses: &[Address]) -> Result<Vec<Utxo>, GatewayError> {
        self.check()?;
        let utxos = self.utxos.read();
        Ok(addresses.iter().filter_map(|a| utxos.get(a)).flatten().cloned().collect())
    }

    async fn protocol_parameters(&self) -> Result<ProtocolParameters, GatewayError> {
        self.check()?;
        (*self.params.read()).ok_or_else(|| GatewayError::ProtocolParametersUnavailable("no epoch rows".into()))
    }

    async fn chain_tip(&self) -> Result<ChainTip, GatewayError> {
        self.check()?;
        Ok(*self.tip.read())
    }

    async fn tx_confirmations(&self, tx_hashes: &[TxHash]) -> Result<Vec<TxConfirmation>, GatewayError> {
        self.check()?;
        let confirmations = self.confirmations.read();
        Ok(tx_hashes
            .iter()
            .map(|h| TxConfirmation { tx_hash: *h, confirmations: confirmations.get(h).copied() })
            .collect())
    }
}
