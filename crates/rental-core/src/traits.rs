//! Trait seams between the builder core and its external collaborators.

use async_trait::async_trait;

use crate::address::Address;
use crate::error::GatewayError;
use crate::types::{
    AccountBalance, AddressAsset, ChainTip, ProtocolParameters, TxConfirmation, TxHash, Utxo,
};

/// Read-only access to an indexer of the chain.
///
/// Implementations own their retry and timeout policy; callers see either
/// a result or the error left after the retry budget is spent. A single
/// instance is meant to be shared (`Arc<dyn ChainQuery>`) by every request.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Controlled totals for the given stake addresses. Unknown or empty
    /// accounts are simply absent from the result.
    async fn account_balances(
        &self,
        stake_addresses: &[Address],
    ) -> Result<Vec<AccountBalance>, GatewayError>;

    /// Native assets held at the given payment addresses.
    async fn address_assets(&self, addresses: &[Address]) -> Result<Vec<AddressAsset>, GatewayError>;

    /// Unspent outputs at the given payment addresses.
    async fn address_utxos(&self, addresses: &[Address]) -> Result<Vec<Utxo>, GatewayError>;

    /// Current protocol parameters. Fails with
    /// [`GatewayError::ProtocolParametersUnavailable`].
    async fn protocol_parameters(&self) -> Result<ProtocolParameters, GatewayError>;

    /// Current chain tip. Fails with [`GatewayError::ChainTipUnavailable`].
    async fn chain_tip(&self) -> Result<ChainTip, GatewayError>;

    /// Confirmation depth of previously built transactions.
    async fn tx_confirmations(&self, tx_hashes: &[TxHash]) -> Result<Vec<TxConfirmation>, GatewayError>;
}
