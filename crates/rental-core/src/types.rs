//! Ledger types: hashes, native assets, balances, UTXOs and transactions.
//!
//! All monetary values are in lovelace (1 ADA = 10^6 lovelace). Quantities
//! are `u64`; arithmetic on them is checked and overflow surfaces as
//! [`TransactionError::ValueOverflow`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::cbor;
use crate::constants::{KEY_HASH_LEN, MAX_ASSET_NAME_LEN, MIN_UTXO_OVERHEAD_BYTES, TX_HASH_LEN};
use crate::crypto::{self, PublicKey, Signature};
use crate::error::TransactionError;

/// Fixed-width byte newtypes rendered as lowercase hex.
macro_rules! hex_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, TransactionError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| {
                    TransactionError::InvalidHashLength { expected: $len, got: bytes.len() }
                })?;
                Ok(Self(arr))
            }

            pub fn from_hex(s: &str) -> Result<Self, TransactionError> {
                let bytes = hex::decode(s).map_err(|e| TransactionError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = TransactionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_bytes!(
    /// Blake2b-256 transaction id.
    TxHash,
    TX_HASH_LEN
);

hex_bytes!(
    /// Blake2b-224 hash of a verification key.
    KeyHash,
    KEY_HASH_LEN
);

hex_bytes!(
    /// Minting policy id (a script hash).
    PolicyId,
    KEY_HASH_LEN
);

// ---------------------------------------------------------------------------
// Native assets
// ---------------------------------------------------------------------------

/// Native asset name: up to 32 arbitrary bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssetName(Vec<u8>);

impl AssetName {
    pub fn new(bytes: Vec<u8>) -> Result<Self, TransactionError> {
        if bytes.len() > MAX_ASSET_NAME_LEN {
            return Err(TransactionError::AssetNameTooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(s).map_err(|e| TransactionError::InvalidHex(e.to_string()))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => write!(f, "AssetName({s:?})"),
            _ => write!(f, "AssetName({})", hex::encode(&self.0)),
        }
    }
}

/// A native asset class: policy id plus asset name.
///
/// Renders as the concatenated hex "unit" (`policy_id ++ asset_name`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId {
    pub policy_id: PolicyId,
    pub name: AssetName,
}

impl AssetId {
    pub fn new(policy_id: PolicyId, name: AssetName) -> Self {
        Self { policy_id, name }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.policy_id, self.name)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({}.{})", self.policy_id, self.name)
    }
}

impl FromStr for AssetId {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let policy_hex_len = KEY_HASH_LEN * 2;
        if s.len() < policy_hex_len || !s.is_char_boundary(policy_hex_len) {
            return Err(TransactionError::InvalidAssetId(s.to_string()));
        }
        let (policy, name) = s.split_at(policy_hex_len);
        Ok(Self {
            policy_id: PolicyId::from_hex(policy)?,
            name: AssetName::from_hex(name)?,
        })
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A quantity of one native asset class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub policy_id: PolicyId,
    #[serde(with = "asset_name_hex")]
    pub name: AssetName,
    pub quantity: u64,
}

impl Asset {
    pub fn id(&self) -> AssetId {
        AssetId::new(self.policy_id, self.name.clone())
    }
}

mod asset_name_hex {
    use super::AssetName;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(name: &AssetName, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&name.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AssetName, D::Error> {
        let s = String::deserialize(deserializer)?;
        AssetName::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// Lovelace plus a bag of native assets.
///
/// Zero-quantity asset entries are never stored, so structural equality
/// matches value equality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub lovelace: u64,
    #[serde(default)]
    assets: BTreeMap<AssetId, u64>,
}

impl Balance {
    pub fn from_lovelace(lovelace: u64) -> Self {
        Self { lovelace, assets: BTreeMap::new() }
    }

    /// Add `quantity` of an asset, builder style.
    pub fn with_asset(mut self, id: AssetId, quantity: u64) -> Self {
        if quantity > 0 {
            let slot = self.assets.entry(id).or_insert(0);
            *slot = slot.saturating_add(quantity);
        }
        self
    }

    /// Quantity held of one asset class.
    pub fn asset(&self, id: &AssetId) -> u64 {
        self.assets.get(id).copied().unwrap_or(0)
    }

    pub fn assets(&self) -> impl Iterator<Item = (&AssetId, u64)> {
        self.assets.iter().map(|(id, q)| (id, *q))
    }

    pub fn asset_ids(&self) -> impl Iterator<Item = &AssetId> {
        self.assets.keys()
    }

    pub fn is_pure_ada(&self) -> bool {
        self.assets.is_empty()
    }

    /// Flatten into the `Asset` list form.
    pub fn asset_list(&self) -> Vec<Asset> {
        self.assets
            .iter()
            .map(|(id, q)| Asset { policy_id: id.policy_id, name: id.name.clone(), quantity: *q })
            .collect()
    }

    pub fn checked_add(&self, other: &Balance) -> Result<Balance, TransactionError> {
        let mut out = self.clone();
        out.lovelace = out.lovelace.checked_add(other.lovelace).ok_or(TransactionError::ValueOverflow)?;
        for (id, q) in &other.assets {
            let slot = out.assets.entry(id.clone()).or_insert(0);
            *slot = slot.checked_add(*q).ok_or(TransactionError::ValueOverflow)?;
        }
        Ok(out)
    }

    /// Subtract `other`, returning `None` if any class would go negative.
    pub fn checked_sub(&self, other: &Balance) -> Option<Balance> {
        let mut out = self.clone();
        out.lovelace = out.lovelace.checked_sub(other.lovelace)?;
        for (id, q) in &other.assets {
            let have = out.assets.get(id).copied().unwrap_or(0);
            let left = have.checked_sub(*q)?;
            if left == 0 {
                out.assets.remove(id);
            } else {
                out.assets.insert(id.clone(), left);
            }
        }
        Some(out)
    }

    /// Whether this balance holds at least `other` in every class.
    pub fn covers(&self, other: &Balance) -> bool {
        self.lovelace >= other.lovelace
            && other.assets.iter().all(|(id, q)| self.asset(id) >= *q)
    }

    /// Sum an iterator of balances.
    pub fn sum<'a, I>(balances: I) -> Result<Balance, TransactionError>
    where
        I: IntoIterator<Item = &'a Balance>,
    {
        balances.into_iter().try_fold(Balance::default(), |acc, b| acc.checked_add(b))
    }
}

// ---------------------------------------------------------------------------
// UTXOs and outputs
// ---------------------------------------------------------------------------

/// Reference to an output of a previous transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: TxHash,
    pub index: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

impl FromStr for OutPoint {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s
            .split_once('#')
            .ok_or_else(|| TransactionError::InvalidOutPoint(s.to_string()))?;
        let index = index.parse().map_err(|_| TransactionError::InvalidOutPoint(s.to_string()))?;
        Ok(Self { tx_hash: TxHash::from_hex(hash)?, index })
    }
}

/// An unspent output: its reference and the value it carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub balance: Balance,
}

/// Why an output exists. Only change outputs may absorb the fee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputPurpose {
    Payment,
    Change,
}

/// A transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub balance: Balance,
    pub purpose: OutputPurpose,
}

impl TxOutput {
    pub fn payment(address: Address, balance: Balance) -> Self {
        Self { address, balance, purpose: OutputPurpose::Payment }
    }

    pub fn change(address: Address, balance: Balance) -> Self {
        Self { address, balance, purpose: OutputPurpose::Change }
    }

    pub fn is_change(&self) -> bool {
        self.purpose == OutputPurpose::Change
    }
}

// ---------------------------------------------------------------------------
// Protocol parameters
// ---------------------------------------------------------------------------

/// Fee and output-size parameters for one build. Never cached across builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    /// Per-byte fee coefficient.
    pub min_fee_a: u64,
    /// Fixed fee coefficient.
    pub min_fee_b: u64,
    /// Lovelace charged per serialized output byte in the min-ADA rule.
    pub coins_per_utxo_byte: u64,
    /// Maximum serialized transaction size in bytes.
    pub max_tx_size: u64,
}

impl ProtocolParameters {
    /// Linear fee for a transaction of `size` bytes.
    pub fn min_fee(&self, size: usize) -> Result<u64, TransactionError> {
        self.min_fee_a
            .checked_mul(size as u64)
            .and_then(|v| v.checked_add(self.min_fee_b))
            .ok_or(TransactionError::ValueOverflow)
    }

    /// Minimum lovelace the given output must carry, as serialized.
    pub fn min_ada(&self, output: &TxOutput) -> Result<u64, TransactionError> {
        let size = cbor::encode_output(output)?.len() as u64;
        Ok((MIN_UTXO_OVERHEAD_BYTES + size).saturating_mul(self.coins_per_utxo_byte))
    }

    /// Smallest lovelace amount that satisfies the min-ADA rule for an output
    /// carrying `assets` to `address`.
    ///
    /// The requirement depends on the encoded width of the lovelace field
    /// itself, so this iterates to a fixed point.
    pub fn min_lovelace_for(&self, address: &Address, assets: &Balance) -> Result<u64, TransactionError> {
        let mut candidate = TxOutput::change(address.clone(), assets.clone());
        candidate.balance.lovelace = 0;
        let mut required = self.min_ada(&candidate)?;
        // Widths grow at most four times (1, 2, 3, 5, 9 byte heads).
        for _ in 0..5 {
            candidate.balance.lovelace = required;
            let next = self.min_ada(&candidate)?;
            if next <= required {
                break;
            }
            required = next;
        }
        Ok(required)
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// The signed-over part of a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionBody {
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    /// Absolute slot after which the transaction is invalid.
    pub ttl: u64,
}

impl TransactionBody {
    pub fn to_cbor(&self) -> Result<Vec<u8>, TransactionError> {
        cbor::encode_body(self)
    }

    /// Blake2b-256 of the serialized body.
    pub fn hash(&self) -> Result<TxHash, TransactionError> {
        Ok(crypto::tx_hash(&self.to_cbor()?))
    }

    pub fn output_total(&self) -> Result<Balance, TransactionError> {
        Balance::sum(self.outputs.iter().map(|o| &o.balance))
    }
}

/// A verification key and its signature over the body hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VKeyWitness {
    pub vkey: [u8; 32],
    pub signature: Signature,
}

impl VKeyWitness {
    pub fn new(vkey: PublicKey, signature: Signature) -> Self {
        Self { vkey: vkey.to_bytes(), signature }
    }

    /// Placeholder with the exact encoded size of a real witness.
    pub fn mock(seq: u8) -> Self {
        Self { vkey: [seq; 32], signature: Signature::ZERO }
    }
}

/// Witnesses attached to a body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WitnessSet {
    pub vkeys: Vec<VKeyWitness>,
}

impl WitnessSet {
    /// `count` placeholder witnesses for fee estimation.
    pub fn mock(count: usize) -> Self {
        Self { vkeys: (0..count).map(|i| VKeyWitness::mock(i as u8)).collect() }
    }

    pub fn len(&self) -> usize {
        self.vkeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vkeys.is_empty()
    }
}

/// A body plus its witnesses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub body: TransactionBody,
    pub witnesses: WitnessSet,
}

impl Transaction {
    pub fn to_cbor(&self) -> Result<Vec<u8>, TransactionError> {
        cbor::encode_transaction(self)
    }

    /// Serialized size in bytes; the fee is linear in this.
    pub fn size(&self) -> Result<usize, TransactionError> {
        Ok(self.to_cbor()?.len())
    }

    pub fn id(&self) -> Result<TxHash, TransactionError> {
        self.body.hash()
    }
}

// ---------------------------------------------------------------------------
// Gateway results
// ---------------------------------------------------------------------------

/// Current chain tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub abs_slot: u64,
    pub epoch: u64,
    pub block_height: u64,
}

/// Controlled total of one stake address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub stake_address: Address,
    pub total_balance: u64,
}

/// One asset holding of a payment address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAsset {
    pub address: Address,
    pub asset: Asset,
}

/// On-chain status of a submitted transaction. `None` means not yet seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxConfirmation {
    pub tx_hash: TxHash,
    pub confirmations: Option<u64>,
}
