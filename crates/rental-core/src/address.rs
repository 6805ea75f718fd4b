//! Shelley address encoding.
//!
//! Two address forms are supported, both Bech32 encoded:
//! - Base address (type 0): header `0x00 | network_id`, payment key hash,
//!   stake key hash. HRP `addr` on mainnet, `addr_test` on test networks.
//! - Stake (reward) address (type 14): header `0xE0 | network_id`, stake key
//!   hash. HRP `stake` / `stake_test`.
//!
//! Addresses carry the header's network id rather than a named network, so
//! `decode(encode(a)) == a` holds for every address.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::KEY_HASH_LEN;
use crate::crypto::PublicKey;
use crate::error::AddressError;
use crate::types::KeyHash;

const BASE_KEY_KEY: u8 = 0x0;
const REWARD_KEY: u8 = 0xE;

const BASE_ADDRESS_LEN: usize = 1 + 2 * KEY_HASH_LEN;
const STAKE_ADDRESS_LEN: usize = 1 + KEY_HASH_LEN;

/// A named network the service can be configured for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

impl Network {
    /// Header network id for addresses on this network.
    pub fn network_id(&self) -> NetworkId {
        match self {
            Network::Mainnet => NetworkId::Mainnet,
            Network::Preprod | Network::Preview => NetworkId::Testnet,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Preprod => "preprod",
            Network::Preview => "preview",
        }
    }

    /// Public Koios endpoint for this network.
    pub fn default_koios_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.koios.rest/api/v1",
            Network::Preprod => "https://preprod.koios.rest/api/v1",
            Network::Preview => "https://preview.koios.rest/api/v1",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "preprod" => Ok(Network::Preprod),
            "preview" => Ok(Network::Preview),
            other => Err(AddressError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl Serialize for Network {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The 4-bit network discriminator stored in an address header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NetworkId {
    Testnet = 0,
    Mainnet = 1,
}

impl NetworkId {
    pub fn from_bits(bits: u8) -> Result<Self, AddressError> {
        match bits {
            0 => Ok(NetworkId::Testnet),
            1 => Ok(NetworkId::Mainnet),
            other => Err(AddressError::UnsupportedNetwork(format!("network id {other}"))),
        }
    }

    fn bits(&self) -> u8 {
        *self as u8
    }

    fn base_hrp(&self) -> &'static str {
        match self {
            NetworkId::Mainnet => "addr",
            NetworkId::Testnet => "addr_test",
        }
    }

    fn stake_hrp(&self) -> &'static str {
        match self {
            NetworkId::Mainnet => "stake",
            NetworkId::Testnet => "stake_test",
        }
    }
}

/// A Shelley address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    /// Payment and delegation both by key hash.
    Base { network: NetworkId, payment: KeyHash, stake: KeyHash },
    /// Reward account identified by a stake key hash.
    Stake { network: NetworkId, stake: KeyHash },
}

impl Address {
    /// Reward address for a stake key.
    pub fn stake(stake_key: &PublicKey, network: Network) -> Self {
        Address::Stake { network: network.network_id(), stake: stake_key.key_hash() }
    }

    /// Base address for a payment key delegating to a stake key.
    pub fn base(payment_key: &PublicKey, stake_key: &PublicKey, network: Network) -> Self {
        Address::Base {
            network: network.network_id(),
            payment: payment_key.key_hash(),
            stake: stake_key.key_hash(),
        }
    }

    pub fn network_id(&self) -> NetworkId {
        match self {
            Address::Base { network, .. } | Address::Stake { network, .. } => *network,
        }
    }

    /// Payment key hash, for base addresses.
    pub fn payment_key_hash(&self) -> Option<&KeyHash> {
        match self {
            Address::Base { payment, .. } => Some(payment),
            Address::Stake { .. } => None,
        }
    }

    pub fn stake_key_hash(&self) -> &KeyHash {
        match self {
            Address::Base { stake, .. } | Address::Stake { stake, .. } => stake,
        }
    }

    pub fn is_stake(&self) -> bool {
        matches!(self, Address::Stake { .. })
    }

    fn hrp(&self) -> &'static str {
        match self {
            Address::Base { network, .. } => network.base_hrp(),
            Address::Stake { network, .. } => network.stake_hrp(),
        }
    }

    /// Raw header-prefixed bytes, as they appear in transaction outputs.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Address::Base { network, payment, stake } => {
                let mut out = Vec::with_capacity(BASE_ADDRESS_LEN);
                out.push((BASE_KEY_KEY << 4) | network.bits());
                out.extend_from_slice(payment.as_bytes());
                out.extend_from_slice(stake.as_bytes());
                out
            }
            Address::Stake { network, stake } => {
                let mut out = Vec::with_capacity(STAKE_ADDRESS_LEN);
                out.push((REWARD_KEY << 4) | network.bits());
                out.extend_from_slice(stake.as_bytes());
                out
            }
        }
    }

    /// Parse raw header-prefixed bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let header = *bytes.first().ok_or(AddressError::Empty)?;
        let network = NetworkId::from_bits(header & 0x0F)?;
        match header >> 4 {
            BASE_KEY_KEY => {
                check_len(bytes, BASE_ADDRESS_LEN)?;
                Ok(Address::Base {
                    network,
                    payment: key_hash_at(bytes, 1),
                    stake: key_hash_at(bytes, 1 + KEY_HASH_LEN),
                })
            }
            REWARD_KEY => {
                check_len(bytes, STAKE_ADDRESS_LEN)?;
                Ok(Address::Stake { network, stake: key_hash_at(bytes, 1) })
            }
            other => Err(AddressError::UnsupportedAddressType(other)),
        }
    }

    /// Bech32 string form.
    pub fn encode(&self) -> String {
        // Both HRPs are static ASCII and well under the length limit.
        let hrp = Hrp::parse_unchecked(self.hrp());
        bech32::encode::<Bech32>(hrp, &self.to_bytes())
            .expect("address payloads always fit the bech32 code length")
    }

    /// Parse a Bech32 address string and check its HRP against the header.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let (hrp, data) = bech32::decode(s).map_err(|e| AddressError::Bech32(e.to_string()))?;
        let hrp = hrp.as_str().to_ascii_lowercase();
        if !matches!(hrp.as_str(), "addr" | "addr_test" | "stake" | "stake_test") {
            return Err(AddressError::UnknownHrp(hrp));
        }
        let address = Self::from_bytes(&data)?;
        if address.hrp() != hrp {
            return Err(AddressError::HrpMismatch { hrp });
        }
        Ok(address)
    }
}

/// Reward address derived from a stake key.
pub fn stake_address(stake_key: &PublicKey, network: Network) -> Address {
    Address::stake(stake_key, network)
}

/// Base address derived from a payment key and a stake key.
pub fn base_address(payment_key: &PublicKey, stake_key: &PublicKey, network: Network) -> Address {
    Address::base(payment_key, stake_key, network)
}

fn check_len(bytes: &[u8], expected: usize) -> Result<(), AddressError> {
    if bytes.len() != expected {
        return Err(AddressError::InvalidLength { expected, got: bytes.len() });
    }
    Ok(())
}

fn key_hash_at(bytes: &[u8], offset: usize) -> KeyHash {
    let mut out = [0u8; KEY_HASH_LEN];
    out.copy_from_slice(&bytes[offset..offset + KEY_HASH_LEN]);
    KeyHash(out)
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Address {
        Address::Base {
            network: NetworkId::Testnet,
            payment: KeyHash([0xAA; 28]),
            stake: KeyHash([0xBB; 28]),
        }
    }

    fn stake() -> Address {
        Address::Stake { network: NetworkId::Mainnet, stake: KeyHash([0xCC; 28]) }
    }

    // --- Network ---

    #[test]
    fn network_ids() {
        assert_eq!(Network::Mainnet.network_id(), NetworkId::Mainnet);
        assert_eq!(Network::Preprod.network_id(), NetworkId::Testnet);
        assert_eq!(Network::Preview.network_id(), NetworkId::Testnet);
    }

    #[test]
    fn network_parse() {
        assert_eq!("Preprod".parse::<Network>().unwrap(), Network::Preprod);
        assert_eq!(
            "sanchonet".parse::<Network>(),
            Err(AddressError::UnsupportedNetwork("sanchonet".into()))
        );
    }

    #[test]
    fn network_serde_string() {
        let json = serde_json::to_string(&Network::Preview).unwrap();
        assert_eq!(json, "\"preview\"");
        assert!(serde_json::from_str::<Network>("\"guildnet\"").is_err());
    }

    // --- Bytes ---

    #[test]
    fn base_bytes_layout() {
        let bytes = base().to_bytes();
        assert_eq!(bytes.len(), 57);
        assert_eq!(bytes[0], 0x00);
        assert_eq!(&bytes[1..29], &[0xAA; 28]);
        assert_eq!(&bytes[29..], &[0xBB; 28]);
    }

    #[test]
    fn stake_bytes_layout() {
        let bytes = stake().to_bytes();
        assert_eq!(bytes.len(), 29);
        assert_eq!(bytes[0], 0xE1);
    }

    #[test]
    fn from_bytes_rejects_unknown_type() {
        let mut bytes = stake().to_bytes();
        bytes[0] = 0x71;
        assert_eq!(Address::from_bytes(&bytes), Err(AddressError::UnsupportedAddressType(0x7)));
    }

    #[test]
    fn from_bytes_rejects_unknown_network() {
        let mut bytes = stake().to_bytes();
        bytes[0] = 0xE5;
        assert!(matches!(Address::from_bytes(&bytes), Err(AddressError::UnsupportedNetwork(_))));
    }

    #[test]
    fn from_bytes_rejects_truncated() {
        let bytes = base().to_bytes();
        assert_eq!(
            Address::from_bytes(&bytes[..40]),
            Err(AddressError::InvalidLength { expected: 57, got: 40 })
        );
        assert_eq!(Address::from_bytes(&[]), Err(AddressError::Empty));
    }

    // --- Bech32 ---

    #[test]
    fn hrp_prefixes() {
        assert!(base().encode().starts_with("addr_test1"));
        assert!(stake().encode().starts_with("stake1"));
        let mainnet_base = Address::Base {
            network: NetworkId::Mainnet,
            payment: KeyHash([1; 28]),
            stake: KeyHash([2; 28]),
        };
        assert!(mainnet_base.encode().starts_with("addr1"));
    }

    #[test]
    fn encode_decode_roundtrip() {
        for addr in [base(), stake()] {
            assert_eq!(Address::decode(&addr.encode()).unwrap(), addr);
        }
    }

    #[test]
    fn decode_rejects_hrp_mismatch() {
        let data = stake().to_bytes();
        let s = bech32::encode::<Bech32>(Hrp::parse("addr").unwrap(), &data).unwrap();
        assert!(matches!(Address::decode(&s), Err(AddressError::HrpMismatch { .. })));
    }

    #[test]
    fn decode_rejects_foreign_hrp() {
        let s = bech32::encode::<Bech32>(Hrp::parse("bc").unwrap(), &[0u8; 20]).unwrap();
        assert_eq!(Address::decode(&s), Err(AddressError::UnknownHrp("bc".into())));
    }

    #[test]
    fn decode_rejects_bad_checksum() {
        let mut s = base().encode();
        let last = s.pop().unwrap();
        s.push(if last == 'q' { 'p' } else { 'q' });
        assert!(matches!(Address::decode(&s), Err(AddressError::Bech32(_))));
    }

    #[test]
    fn serde_as_string() {
        let addr = base();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.encode()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn key_derived_addresses_share_stake_hash() {
        let sk = ed25519_dalek::SigningKey::from_bytes(&[3u8; 32]);
        let pk = PublicKey::from(sk.verifying_key());
        let stake_addr = stake_address(&pk, Network::Preprod);
        let base_addr = base_address(&pk, &pk, Network::Preprod);
        assert_eq!(stake_addr.stake_key_hash(), base_addr.stake_key_hash());
        assert_eq!(base_addr.payment_key_hash(), Some(&pk.key_hash()));
    }
}
