//! Seed derivation along CIP-1852 paths.
//!
//! The master key follows the Icarus scheme: PBKDF2-HMAC-SHA512 over the
//! phrase entropy (empty passphrase, 4096 rounds, 96 bytes), clamped into an
//! Ed25519 extended key plus chain code. Children use BIP32-Ed25519 (V2):
//! hardened indices mix the private extended key, soft indices the public
//! key, both keyed by the parent chain code.
//!
//! Paths are fixed to `m / 1852' / 1815' / account' / role / index`.

use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::VerifyingKey;
use ed25519_dalek::hazmat::{ExpandedSecretKey, raw_sign};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use rental_core::address::{Address, Network};
use rental_core::constants::{ADA_COIN_TYPE, CIP1852_PURPOSE, HARDENED_OFFSET};
use rental_core::crypto::{PublicKey, Signature};
use rental_core::types::KeyHash;

use crate::error::WalletError;
use crate::mnemonic::SeedPhrase;

type HmacSha512 = Hmac<Sha512>;

const PBKDF2_ROUNDS: u32 = 4096;

/// Chain role within an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Receiving addresses.
    External = 0,
    /// Internal change addresses.
    Internal = 1,
    /// Stake (reward) keys.
    Staking = 2,
}

/// A CIP-1852 derivation path. Purpose and coin type are fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    pub account: u32,
    pub role: Role,
    pub index: u32,
}

impl DerivationPath {
    pub fn new(account: u32, role: Role, index: u32) -> Self {
        Self { account, role, index }
    }

    /// First external key of an account.
    pub fn payment(account: u32) -> Self {
        Self::new(account, Role::External, 0)
    }

    /// First stake key of an account.
    pub fn stake(account: u32) -> Self {
        Self::new(account, Role::Staking, 0)
    }

    pub fn purpose(&self) -> u32 {
        CIP1852_PURPOSE
    }

    pub fn coin_type(&self) -> u32 {
        ADA_COIN_TYPE
    }

    /// Raw child indices, hardening applied.
    pub fn segments(&self) -> Result<[u32; 5], WalletError> {
        if self.account >= HARDENED_OFFSET {
            return Err(WalletError::KeyDerivation(format!("account index {} out of range", self.account)));
        }
        if self.index >= HARDENED_OFFSET {
            return Err(WalletError::KeyDerivation(format!("address index {} out of range", self.index)));
        }
        Ok([
            CIP1852_PURPOSE | HARDENED_OFFSET,
            ADA_COIN_TYPE | HARDENED_OFFSET,
            self.account | HARDENED_OFFSET,
            self.role as u32,
            self.index,
        ])
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m/{}'/{}'/{}'/{}/{}",
            CIP1852_PURPOSE, ADA_COIN_TYPE, self.account, self.role as u32, self.index
        )
    }
}

/// An extended private key and chain code.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct ExtendedKey {
    /// kL (clamped scalar) || kR (nonce key).
    xprv: [u8; 64],
    chain_code: [u8; 32],
}

impl ExtendedKey {
    /// Icarus master key from BIP-39 entropy.
    fn master(entropy: &[u8]) -> Self {
        let mut out = Zeroizing::new([0u8; 96]);
        pbkdf2::pbkdf2_hmac::<Sha512>(b"", entropy, PBKDF2_ROUNDS, &mut out[..]);
        out[0] &= 0b1111_1000;
        out[31] &= 0b0001_1111;
        out[31] |= 0b0100_0000;

        let mut xprv = [0u8; 64];
        let mut chain_code = [0u8; 32];
        xprv.copy_from_slice(&out[..64]);
        chain_code.copy_from_slice(&out[64..]);
        Self { xprv, chain_code }
    }

    /// kL as the signing scalar, kR as the nonce prefix. kL is used as is:
    /// derived children are not re-clamped.
    fn expanded(&self) -> ExpandedSecretKey {
        let mut kl = Zeroizing::new([0u8; 32]);
        let mut hash_prefix = [0u8; 32];
        kl.copy_from_slice(&self.xprv[..32]);
        hash_prefix.copy_from_slice(&self.xprv[32..]);
        ExpandedSecretKey { scalar: Scalar::from_bytes_mod_order(*kl), hash_prefix }
    }

    fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.expanded())
    }

    fn public_bytes(&self) -> [u8; 32] {
        self.verifying_key().to_bytes()
    }

    fn derive_child(&self, index: u32) -> Result<Self, WalletError> {
        let idx = index.to_le_bytes();
        let (z, i) = if index >= HARDENED_OFFSET {
            (
                self.hmac(&[&[0x00], &self.xprv, &idx])?,
                self.hmac(&[&[0x01], &self.xprv, &idx])?,
            )
        } else {
            let pk = self.public_bytes();
            (
                self.hmac(&[&[0x02], &pk, &idx])?,
                self.hmac(&[&[0x03], &pk, &idx])?,
            )
        };

        let mut kl = [0u8; 32];
        let mut kr = [0u8; 32];
        kl.copy_from_slice(&self.xprv[..32]);
        kr.copy_from_slice(&self.xprv[32..]);
        let new_kl = add_28_mul8(&kl, &z[..28]);
        let new_kr = add_256(&kr, &z[32..64]);
        kl.zeroize();
        kr.zeroize();

        let mut child = Self { xprv: [0u8; 64], chain_code: [0u8; 32] };
        child.xprv[..32].copy_from_slice(&new_kl);
        child.xprv[32..].copy_from_slice(&new_kr);
        child.chain_code.copy_from_slice(&i[32..64]);
        Ok(child)
    }

    fn hmac(&self, parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>, WalletError> {
        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|_| WalletError::KeyDerivation("HMAC initialization failed".into()))?;
        for part in parts {
            mac.update(part);
        }
        let mut out = Zeroizing::new([0u8; 64]);
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }
}

/// `x + 8 * y` over the low 28 bytes of `y`, little endian.
fn add_28_mul8(x: &[u8; 32], y: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry: u16 = 0;
    for i in 0..28 {
        let r = u16::from(x[i]) + (u16::from(y[i]) << 3) + carry;
        out[i] = r as u8;
        carry = r >> 8;
    }
    for i in 28..32 {
        let r = u16::from(x[i]) + carry;
        out[i] = r as u8;
        carry = r >> 8;
    }
    out
}

/// `x + y mod 2^256`, little endian.
fn add_256(x: &[u8; 32], y: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry: u16 = 0;
    for i in 0..32 {
        let r = u16::from(x[i]) + u16::from(y[i]) + carry;
        out[i] = r as u8;
        carry = r >> 8;
    }
    out
}

/// Key material at a derivation path.
///
/// Owned exclusively by the caller that derived it. Secret bytes are zeroized
/// on drop and never appear in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyNode {
    key: ExtendedKey,
    #[zeroize(skip)]
    path: DerivationPath,
}

impl KeyNode {
    pub fn path(&self) -> &DerivationPath {
        &self.path
    }

    pub fn public_key(&self) -> Result<PublicKey, WalletError> {
        Ok(PublicKey::from(self.key.verifying_key()))
    }

    pub fn key_hash(&self) -> Result<KeyHash, WalletError> {
        Ok(self.public_key()?.key_hash())
    }

    /// Ed25519 signature with the extended key. The nonce is derived from kR.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let esk = self.key.expanded();
        let sig = raw_sign::<Sha512>(&esk, message, &VerifyingKey::from(&esk));
        Signature(sig.to_bytes())
    }
}

impl fmt::Debug for KeyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyNode")
            .field("path", &self.path.to_string())
            .finish_non_exhaustive()
    }
}

/// Derive the key at `path` from a validated seed phrase.
///
/// Pure and deterministic: the same phrase and path always yield the same key.
pub fn derive(phrase: &SeedPhrase, path: &DerivationPath) -> Result<KeyNode, WalletError> {
    let segments = path.segments()?;
    let entropy = phrase.entropy()?;
    let mut key = ExtendedKey::master(&entropy);
    for segment in segments {
        key = key.derive_child(segment)?;
    }
    Ok(KeyNode { key, path: *path })
}

/// The payment and stake keys of one account, with the addresses they form.
pub struct Account {
    index: u32,
    network: Network,
    payment: KeyNode,
    stake: KeyNode,
    base_address: Address,
    stake_address: Address,
}

impl Account {
    /// Derive account `index` (payment `External/0`, stake `Staking/0`).
    pub fn derive(phrase: &SeedPhrase, network: Network, index: u32) -> Result<Self, WalletError> {
        let payment = derive(phrase, &DerivationPath::payment(index))?;
        let stake = derive(phrase, &DerivationPath::stake(index))?;
        let payment_pk = payment.public_key()?;
        let stake_pk = stake.public_key()?;
        Ok(Self {
            index,
            network,
            base_address: Address::base(&payment_pk, &stake_pk, network),
            stake_address: Address::stake(&stake_pk, network),
            payment,
            stake,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn base_address(&self) -> &Address {
        &self.base_address
    }

    pub fn stake_address(&self) -> &Address {
        &self.stake_address
    }

    pub fn payment_key(&self) -> &KeyNode {
        &self.payment
    }

    pub fn stake_key(&self) -> &KeyNode {
        &self.stake
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("index", &self.index)
            .field("network", &self.network)
            .field("base_address", &self.base_address.to_string())
            .field("stake_address", &self.stake_address.to_string())
            .finish_non_exhaustive()
    }
}
