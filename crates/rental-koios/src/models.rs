//! Koios response rows and their conversion into ledger types.
//!
//! Koios serializes lovelace and quantities as strings on some endpoints and
//! as integers on others; every numeric field here accepts both.

use serde::{Deserialize, Deserializer};

use rental_core::address::Address;
use rental_core::error::GatewayError;
use rental_core::types::{
    AccountBalance, AddressAsset, Asset, AssetId, AssetName, Balance, ChainTip, OutPoint, PolicyId,
    ProtocolParameters, TxConfirmation, TxHash, Utxo,
};

// ---------------------------------------------------------------------------
// Lenient numbers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u64),
    Text(String),
}

impl Number {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Number::Int(n) => Ok(n),
            Number::Text(s) => s.trim().parse().map_err(|_| E::custom(format!("not an unsigned integer: {s:?}"))),
        }
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Number::deserialize(d)?.into_u64()
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Option::<Number>::deserialize(d)?.map(Number::into_u64).transpose()
}

fn decode<T, E: std::fmt::Display>(what: &str, r: Result<T, E>) -> Result<T, GatewayError> {
    r.map_err(|e| GatewayError::Decode(format!("{what}: {e}")))
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// `/account_info` row.
#[derive(Debug, Deserialize)]
pub struct AccountInfoRow {
    pub stake_address: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub total_balance: u64,
}

impl AccountInfoRow {
    pub fn into_balance(self) -> Result<AccountBalance, GatewayError> {
        Ok(AccountBalance {
            stake_address: decode("stake_address", Address::decode(&self.stake_address))?,
            total_balance: self.total_balance,
        })
    }
}

/// Asset entry inside a UTXO or an `/address_assets` row.
#[derive(Debug, Deserialize)]
pub struct AssetRow {
    pub policy_id: String,
    /// Hex; `null` for the empty name.
    #[serde(default)]
    pub asset_name: Option<String>,
    #[serde(deserialize_with = "lenient_u64")]
    pub quantity: u64,
}

impl AssetRow {
    pub fn id(&self) -> Result<AssetId, GatewayError> {
        let policy = decode("policy_id", PolicyId::from_hex(&self.policy_id))?;
        let name = decode("asset_name", AssetName::from_hex(self.asset_name.as_deref().unwrap_or("")))?;
        Ok(AssetId::new(policy, name))
    }
}

/// `/address_assets` row (flat form, one asset per row).
#[derive(Debug, Deserialize)]
pub struct AddressAssetRow {
    pub address: String,
    #[serde(flatten)]
    pub asset: AssetRow,
}

impl AddressAssetRow {
    pub fn into_holding(self) -> Result<AddressAsset, GatewayError> {
        let id = self.asset.id()?;
        Ok(AddressAsset {
            address: decode("address", Address::decode(&self.address))?,
            asset: Asset { policy_id: id.policy_id, name: id.name, quantity: self.asset.quantity },
        })
    }
}

/// `/address_info` row; only the UTXO set is used.
#[derive(Debug, Deserialize)]
pub struct AddressInfoRow {
    pub address: String,
    #[serde(default)]
    pub utxo_set: Vec<UtxoRow>,
}

#[derive(Debug, Deserialize)]
pub struct UtxoRow {
    pub tx_hash: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub tx_index: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub value: u64,
    #[serde(default)]
    pub asset_list: Vec<AssetRow>,
}

impl UtxoRow {
    pub fn into_utxo(self) -> Result<Utxo, GatewayError> {
        let tx_hash = decode("tx_hash", TxHash::from_hex(&self.tx_hash))?;
        let index = decode("tx_index", u32::try_from(self.tx_index))?;
        let outpoint = OutPoint { tx_hash, index };
        if self.value == 0 {
            return Err(GatewayError::Decode(format!("utxo {outpoint} has zero lovelace")));
        }
        let mut balance = Balance::from_lovelace(self.value);
        for asset in &self.asset_list {
            balance = balance.with_asset(asset.id()?, asset.quantity);
        }
        Ok(Utxo { outpoint, balance })
    }
}

/// `/epoch_params` row. Fields are optional so a partial row maps to
/// [`GatewayError::ProtocolParametersUnavailable`] instead of a decode error.
#[derive(Debug, Deserialize)]
pub struct EpochParamsRow {
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub epoch_no: Option<u64>,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub min_fee_a: Option<u64>,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub min_fee_b: Option<u64>,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub max_tx_size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_opt_u64", alias = "coins_per_utxo_byte")]
    pub coins_per_utxo_size: Option<u64>,
}

impl EpochParamsRow {
    pub fn into_params(self) -> Result<ProtocolParameters, GatewayError> {
        let missing = |field: &str| GatewayError::ProtocolParametersUnavailable(format!("{field} missing"));
        Ok(ProtocolParameters {
            min_fee_a: self.min_fee_a.ok_or_else(|| missing("min_fee_a"))?,
            min_fee_b: self.min_fee_b.ok_or_else(|| missing("min_fee_b"))?,
            coins_per_utxo_byte: self.coins_per_utxo_size.ok_or_else(|| missing("coins_per_utxo_size"))?,
            max_tx_size: self.max_tx_size.ok_or_else(|| missing("max_tx_size"))?,
        })
    }
}

/// `/tip` row.
#[derive(Debug, Deserialize)]
pub struct TipRow {
    #[serde(deserialize_with = "lenient_u64")]
    pub epoch_no: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub abs_slot: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub block_no: u64,
}

impl From<TipRow> for ChainTip {
    fn from(row: TipRow) -> Self {
        ChainTip { abs_slot: row.abs_slot, epoch: row.epoch_no, block_height: row.block_no }
    }
}

/// `/tx_status` row.
#[derive(Debug, Deserialize)]
pub struct TxStatusRow {
    pub tx_hash: String,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub num_confirmations: Option<u64>,
}

impl TxStatusRow {
    pub fn into_confirmation(self) -> Result<TxConfirmation, GatewayError> {
        Ok(TxConfirmation {
            tx_hash: decode("tx_hash", TxHash::from_hex(&self.tx_hash))?,
            confirmations: self.num_confirmations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8";
    const POLICY: &str = "9999999999999999999999999999999999999999999999999999999999999999";

    #[test]
    fn numbers_accept_strings_and_ints() {
        let a: TipRow = serde_json::from_str(r#"{"epoch_no":"120","abs_slot":5000,"block_no":" 7 "}"#).unwrap();
        assert_eq!(ChainTip::from(a), ChainTip { abs_slot: 5000, epoch: 120, block_height: 7 });
    }

    #[test]
    fn negative_or_garbage_number_rejected() {
        assert!(serde_json::from_str::<TipRow>(r#"{"epoch_no":"x","abs_slot":1,"block_no":1}"#).is_err());
        assert!(serde_json::from_str::<TipRow>(r#"{"epoch_no":-1,"abs_slot":1,"block_no":1}"#).is_err());
    }

    #[test]
    fn utxo_with_assets() {
        let policy = &POLICY[..56];
        let json = format!(
            r#"{{"tx_hash":"{HASH}","tx_index":1,"value":"1500000",
                "asset_list":[{{"policy_id":"{policy}","asset_name":"52656e74616c3031","quantity":"1"}}]}}"#
        );
        let row: UtxoRow = serde_json::from_str(&json).unwrap();
        let utxo = row.into_utxo().unwrap();
        assert_eq!(utxo.outpoint.index, 1);
        assert_eq!(utxo.balance.lovelace, 1_500_000);
        let id: AssetId = format!("{policy}52656e74616c3031").parse().unwrap();
        assert_eq!(utxo.balance.asset(&id), 1);
    }

    #[test]
    fn zero_value_utxo_is_decode_error() {
        let json = format!(r#"{{"tx_hash":"{HASH}","tx_index":0,"value":"0"}}"#);
        let row: UtxoRow = serde_json::from_str(&json).unwrap();
        assert!(matches!(row.into_utxo(), Err(GatewayError::Decode(_))));
    }

    #[test]
    fn null_asset_name_is_empty() {
        let policy = &POLICY[..56];
        let json = format!(r#"{{"policy_id":"{policy}","asset_name":null,"quantity":3}}"#);
        let row: AssetRow = serde_json::from_str(&json).unwrap();
        assert!(row.id().unwrap().name.as_bytes().is_empty());
    }

    #[test]
    fn epoch_params_complete() {
        let row: EpochParamsRow = serde_json::from_str(
            r#"{"epoch_no":120,"min_fee_a":44,"min_fee_b":155381,"max_tx_size":16384,"coins_per_utxo_size":"4310"}"#,
        )
        .unwrap();
        let p = row.into_params().unwrap();
        assert_eq!(p, ProtocolParameters { min_fee_a: 44, min_fee_b: 155_381, coins_per_utxo_byte: 4_310, max_tx_size: 16_384 });
    }

    #[test]
    fn epoch_params_missing_field_unavailable() {
        let row: EpochParamsRow = serde_json::from_str(r#"{"epoch_no":120,"min_fee_a":44,"min_fee_b":null}"#).unwrap();
        assert_eq!(
            row.into_params().unwrap_err(),
            GatewayError::ProtocolParametersUnavailable("min_fee_b missing".into())
        );
    }

    #[test]
    fn unseen_tx_has_no_confirmations() {
        let row: TxStatusRow = serde_json::from_str(&format!(r#"{{"tx_hash":"{HASH}","num_confirmations":null}}"#)).unwrap();
        assert_eq!(row.into_confirmation().unwrap().confirmations, None);
    }

    #[test]
    fn bad_stake_address_is_decode_error() {
        let row: AccountInfoRow = serde_json::from_str(r#"{"stake_address":"stake_test1xyz","total_balance":"5"}"#).unwrap();
        assert!(matches!(row.into_balance(), Err(GatewayError::Decode(_))));
    }
}
