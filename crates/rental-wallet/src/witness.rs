//! Witness stage: turns a fee-converged body into a witness set.

use rental_core::crypto::PublicKey;
use rental_core::types::{TransactionBody, VKeyWitness, WitnessSet};

use crate::error::WalletError;
use crate::keys::{Account, KeyNode};

/// Produces witnesses for a transaction body.
///
/// The signer is a seam: the assembler only needs the witness set back, so a
/// hardware wallet or remote signer can stand in for local keys.
pub trait WitnessStage: Send + Sync {
    fn witness(&self, body: &TransactionBody) -> Result<WitnessSet, WalletError>;
}

/// Signs the body hash with locally derived extended keys.
pub struct ExtendedKeySigner<'a> {
    keys: Vec<&'a KeyNode>,
}

impl<'a> ExtendedKeySigner<'a> {
    pub fn new(keys: Vec<&'a KeyNode>) -> Self {
        Self { keys }
    }

    /// Payment and stake key of an account: two witnesses.
    pub fn for_account(account: &'a Account) -> Self {
        Self::new(vec![account.payment_key(), account.stake_key()])
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

impl WitnessStage for ExtendedKeySigner<'_> {
    fn witness(&self, body: &TransactionBody) -> Result<WitnessSet, WalletError> {
        if self.keys.is_empty() {
            return Err(WalletError::Witness("no signing keys".into()));
        }
        let hash = body.hash()?;
        let vkeys = self
            .keys
            .iter()
            .map(|key| Ok(VKeyWitness::new(key.public_key()?, key.sign(hash.as_bytes()))))
            .collect::<Result<Vec<_>, WalletError>>()?;
        Ok(WitnessSet { vkeys })
    }
}

/// Check every witness signature against the body hash.
pub fn verify_witnesses(body: &TransactionBody, witnesses: &WitnessSet) -> Result<(), WalletError> {
    let hash = body.hash()?;
    for w in &witnesses.vkeys {
        PublicKey::from_bytes(&w.vkey)?.verify(hash.as_bytes(), &w.signature)?;
    }
    Ok(())
}
