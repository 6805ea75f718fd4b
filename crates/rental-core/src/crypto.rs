//! Hashing and Ed25519 verification primitives.
//!
//! Key hashes are Blake2b-224 of the raw 32-byte public key; transaction ids
//! are Blake2b-256 of the serialized body. Signing lives with the key
//! material in `rental-wallet`; this module only verifies.

use ed25519_dalek::Verifier;
use std::fmt;

use crate::constants::KEY_HASH_LEN;
use crate::error::CryptoError;
use crate::types::{KeyHash, TxHash};

/// Blake2b with a 224-bit digest.
pub fn blake2b_224(data: &[u8]) -> [u8; KEY_HASH_LEN] {
    let hash = blake2b_simd::Params::new().hash_length(KEY_HASH_LEN).hash(data);
    let mut out = [0u8; KEY_HASH_LEN];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Blake2b with a 256-bit digest.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let hash = blake2b_simd::Params::new().hash_length(32).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Transaction id of a serialized body.
pub fn tx_hash(body_bytes: &[u8]) -> TxHash {
    TxHash(blake2b_256(body_bytes))
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// All-zero signature used for size estimation.
    pub const ZERO: Self = Self([0u8; 64]);

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

/// Ed25519 public key for verifying witnesses and deriving key hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wrap raw public key bytes, rejecting points that do not decompress.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(*bytes))
    }

    /// Wrap bytes already known to be a compressed curve point.
    pub(crate) fn from_trusted(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Blake2b-224 hash used in addresses.
    pub fn key_hash(&self) -> KeyHash {
        KeyHash(blake2b_224(&self.0))
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        vk.verify(message, &sig).map_err(|_| CryptoError::VerificationFailed)
    }
}

impl From<ed25519_dalek::VerifyingKey> for PublicKey {
    fn from(vk: ed25519_dalek::VerifyingKey) -> Self {
        Self::from_trusted(vk.to_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
