//! BIP-39 seed phrase handling.
//!
//! A [`SeedPhrase`] is validated on construction and zeroized on drop. Its
//! `Debug` output is redacted and no error built from it ever echoes words.

use bip39::{Language, Mnemonic};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::WalletError;

/// A validated English BIP-39 phrase (12 to 24 words).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SeedPhrase {
    normalized: String,
}

impl SeedPhrase {
    /// Parse and validate a phrase.
    ///
    /// Normalizes whitespace and converts to lowercase before parsing.
    pub fn parse(phrase: &str) -> Result<Self, WalletError> {
        let normalized = Zeroizing::new(
            phrase
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        );
        Mnemonic::parse_in(Language::English, normalized.as_str()).map_err(|e| {
            WalletError::InvalidSeedPhrase(match e {
                bip39::Error::BadWordCount(_) => "unsupported word count",
                bip39::Error::UnknownWord(_) => "word not in the English list",
                bip39::Error::InvalidChecksum => "checksum mismatch",
                _ => "malformed phrase",
            })
        })?;
        Ok(Self { normalized: (*normalized).clone() })
    }

    /// Number of words in the phrase.
    pub fn word_count(&self) -> usize {
        self.normalized.split(' ').count()
    }

    /// Raw BIP-39 entropy (16 to 32 bytes). Handle with care.
    pub fn entropy(&self) -> Result<Zeroizing<Vec<u8>>, WalletError> {
        let m = Mnemonic::parse_in(Language::English, self.normalized.as_str())
            .map_err(|_| WalletError::InvalidSeedPhrase("malformed phrase"))?;
        Ok(Zeroizing::new(m.to_entropy()))
    }
}

impl fmt::Debug for SeedPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedPhrase")
            .field("words", &self.word_count())
            .field("phrase", &"[REDACTED]")
            .finish()
    }
}
