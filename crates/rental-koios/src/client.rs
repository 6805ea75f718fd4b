//! Koios HTTP client.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use rental_core::address::{Address, Network};
use rental_core::error::GatewayError;
use rental_core::traits::ChainQuery;
use rental_core::types::{
    AccountBalance, AddressAsset, ChainTip, ProtocolParameters, TxConfirmation, TxHash, Utxo,
};

use crate::models::{
    AccountInfoRow, AddressAssetRow, AddressInfoRow, EpochParamsRow, TipRow, TxStatusRow,
};

/// Retry budget for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles per attempt.
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4, initial_backoff_ms: 250, max_backoff_ms: 4_000 }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, initial_backoff_ms: 0, max_backoff_ms: 0 }
    }

    fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(2)
            .factor((self.initial_backoff_ms / 2).max(1))
            .max_delay(Duration::from_millis(self.max_backoff_ms))
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1))
    }
}

/// Shared Koios client. Cheap to share behind an `Arc`; holds one
/// connection pool.
#[derive(Debug, Clone)]
pub struct KoiosClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl KoiosClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), retry })
    }

    /// Client for the public Koios instance of `network`.
    pub fn for_network(network: Network, timeout: Duration, retry: RetryPolicy) -> Result<Self, GatewayError> {
        Self::new(network.default_koios_url(), timeout, retry)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        RetryIf::spawn(
            self.retry.delays(),
            || self.attempt(method.clone(), &url, body.as_ref()),
            |e: &GatewayError| {
                let retry = e.is_transient();
                if retry {
                    warn!(path, error = %e, "koios request failed, retrying");
                }
                retry
            },
        )
        .await
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<T, GatewayError> {
        let mut req = self.http.request(method, url).header("accept", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited);
        }
        if !status.is_success() {
            return Err(GatewayError::Http { status: status.as_u16() });
        }
        let bytes = resp.bytes().await.map_err(transport)?;
        debug!(url, bytes = bytes.len(), "koios response");
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, GatewayError> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        self.request(Method::GET, path, None).await
    }
}

fn transport(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

fn bech32_list(addresses: &[Address]) -> Vec<String> {
    addresses.iter().map(Address::encode).collect()
}

#[async_trait]
impl ChainQuery for KoiosClient {
    async fn account_balances(&self, stake_addresses: &[Address]) -> Result<Vec<AccountBalance>, GatewayError> {
        if stake_addresses.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<AccountInfoRow> = self
            .post("/account_info", json!({ "_stake_addresses": bech32_list(stake_addresses) }))
            .await?;
        rows.into_iter().map(AccountInfoRow::into_balance).collect()
    }

    async fn address_assets(&self, addresses: &[Address]) -> Result<Vec<AddressAsset>, GatewayError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<AddressAssetRow> = self
            .post("/address_assets", json!({ "_addresses": bech32_list(addresses) }))
            .await?;
        rows.into_iter().map(AddressAssetRow::into_holding).collect()
    }

    async fn address_utxos(&self, addresses: &[Address]) -> Result<Vec<Utxo>, GatewayError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<AddressInfoRow> = self
            .post("/address_info", json!({ "_addresses": bech32_list(addresses) }))
            .await?;
        rows.into_iter()
            .flat_map(|row| row.utxo_set)
            .map(|u| u.into_utxo())
            .collect()
    }

    async fn protocol_parameters(&self) -> Result<ProtocolParameters, GatewayError> {
        let rows: Vec<EpochParamsRow> = self
            .get("/epoch_params?limit=1&order=epoch_no.desc")
            .await
            .map_err(|e| unavailable_if_transient(e, GatewayError::ProtocolParametersUnavailable))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| GatewayError::ProtocolParametersUnavailable("empty response".into()))?
            .into_params()
    }

    async fn chain_tip(&self) -> Result<ChainTip, GatewayError> {
        let rows: Vec<TipRow> = self
            .get("/tip")
            .await
            .map_err(|e| unavailable_if_transient(e, GatewayError::ChainTipUnavailable))?;
        rows.into_iter()
            .next()
            .map(ChainTip::from)
            .ok_or_else(|| GatewayError::ChainTipUnavailable("empty response".into()))
    }

    async fn tx_confirmations(&self, tx_hashes: &[TxHash]) -> Result<Vec<TxConfirmation>, GatewayError> {
        if tx_hashes.is_empty() {
            return Ok(Vec::new());
        }
        let hashes: Vec<String> = tx_hashes.iter().map(TxHash::to_string).collect();
        let rows: Vec<TxStatusRow> = self.post("/tx_status", json!({ "_tx_hashes": hashes })).await?;
        rows.into_iter().map(TxStatusRow::into_confirmation).collect()
    }
}

/// Wrap a failure the retry budget could not clear in `unavailable`.
/// Decode and 4xx failures keep their own, non-transient kind.
fn unavailable_if_transient(e: GatewayError, unavailable: fn(String) -> GatewayError) -> GatewayError {
    match e {
        GatewayError::ProtocolParametersUnavailable(_) | GatewayError::ChainTipUnavailable(_) => e,
        e if e.is_transient() => unavailable(e.to_string()),
        e => e,
    }
}
