//! Service settings.
//!
//! Layered as: built-in defaults, then an optional TOML file, then
//! `RENTAL_*` environment variables (`__` separates nested keys, e.g.
//! `RENTAL_KOIOS__TIMEOUT_SECS=30`).
//!
//! Seed phrases are not part of the settings tree. They are injected at
//! start-up from `RENTAL_PROVIDER_SEED` / `RENTAL_USER_SEED` or from the
//! files named by `secrets.provider_seed_file` / `secrets.user_seed_file`.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use rental_core::address::Network;
use rental_core::constants::{DEFAULT_TTL_HORIZON_SLOTS, DEFAULT_WITNESS_COUNT, LOVELACE_PER_ADA};

use crate::error::RentalError;

pub const ENV_PREFIX: &str = "RENTAL";
pub const PROVIDER_SEED_ENV: &str = "RENTAL_PROVIDER_SEED";
pub const USER_SEED_ENV: &str = "RENTAL_USER_SEED";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub network: Network,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    pub koios: KoiosSettings,
    pub rental: RentalSettings,
    pub secrets: SecretSources,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: Network::Preprod,
            bind_addr: "127.0.0.1:8080".to_string(),
            koios: KoiosSettings::default(),
            rental: RentalSettings::default(),
            secrets: SecretSources::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KoiosSettings {
    /// Overrides the public endpoint of the configured network.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for KoiosSettings {
    fn default() -> Self {
        Self { base_url: None, timeout_secs: 20, max_attempts: 4, initial_backoff_ms: 250, max_backoff_ms: 4_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RentalSettings {
    /// Lovelace paid to the provider alongside the NFT.
    pub sale_price_lovelace: u64,
    pub ttl_horizon_slots: u64,
    pub witness_count: usize,
    /// Account index derived for both provider and user.
    pub account_index: u32,
    /// Confirmations required before a lock counts as observed.
    pub required_confirmations: u64,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
}

impl Default for RentalSettings {
    fn default() -> Self {
        Self {
            sale_price_lovelace: 2 * LOVELACE_PER_ADA,
            ttl_horizon_slots: DEFAULT_TTL_HORIZON_SLOTS,
            witness_count: DEFAULT_WITNESS_COUNT,
            account_index: 0,
            required_confirmations: 1,
            poll_interval_secs: 20,
            max_polls: 90,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SecretSources {
    pub provider_seed_file: Option<PathBuf>,
    pub user_seed_file: Option<PathBuf>,
}

impl Settings {
    /// `<config dir>/nft-rental/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nft-rental")
            .join("config.toml")
    }

    /// Load settings from `path` (or [`Settings::default_path`]) and the
    /// environment. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, RentalError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(config::Config::try_deserialize::<Settings>)
            .map_err(|e| RentalError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), RentalError> {
        if self.rental.witness_count == 0 {
            return Err(RentalError::Config("rental.witness_count must be at least 1".into()));
        }
        if self.koios.max_attempts == 0 {
            return Err(RentalError::Config("koios.max_attempts must be at least 1".into()));
        }
        if self.rental.sale_price_lovelace == 0 {
            return Err(RentalError::Config("rental.sale_price_lovelace must be positive".into()));
        }
        Ok(())
    }

    /// Koios endpoint: the override if set, else the network's public one.
    pub fn koios_url(&self) -> String {
        self.koios
            .base_url
            .clone()
            .unwrap_or_else(|| self.network.default_koios_url().to_string())
    }

    /// Read both seed phrases from the process environment or secret files.
    pub fn seeds(&self) -> Result<Seeds, RentalError> {
        self.seeds_from(|key| std::env::var(key).ok())
    }

    /// As [`Settings::seeds`] with an explicit variable lookup.
    pub fn seeds_from(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<Seeds, RentalError> {
        Ok(Seeds {
            provider: load_secret(&lookup, PROVIDER_SEED_ENV, self.secrets.provider_seed_file.as_deref())?,
            user: load_secret(&lookup, USER_SEED_ENV, self.secrets.user_seed_file.as_deref())?,
        })
    }
}

fn load_secret(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    file: Option<&Path>,
) -> Result<Secret, RentalError> {
    if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
        return Ok(Secret::new(value));
    }
    let Some(file) = file else {
        return Err(RentalError::Config(format!("{var} is not set and no secret file is configured")));
    };
    let value = std::fs::read_to_string(file)
        .map_err(|e| RentalError::Config(format!("reading secret file {}: {e}", file.display())))?;
    if value.trim().is_empty() {
        return Err(RentalError::Config(format!("secret file {} is empty", file.display())));
    }
    Ok(Secret::new(value))
}

/// A secret string: zeroized on drop, redacted in `Debug`.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    pub fn expose(&self) -> &str {
        self.0.trim()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// The two seed phrases the service derives its accounts from.
#[derive(Debug, Clone)]
pub struct Seeds {
    pub provider: Secret,
    pub user: Secret,
}
