//! Service error types.

use rental_core::error::{AddressError, GatewayError, TransactionError};
use rental_wallet::WalletError;
use thiserror::Error;

/// Errors surfaced by rental operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RentalError {
    /// Derivation, selection or assembly failure.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Chain-query failure left after the gateway's retry budget.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The lease is not in a state that permits the action.
    #[error("cannot {action} {asset}: lease is {state}")]
    InvalidTransition {
        asset: String,
        state: &'static str,
        action: &'static str,
    },

    /// No lease or pending lock exists for the asset.
    #[error("not found: {0}")]
    NotFound(String),

    /// The lock transaction was not confirmed within the polling budget.
    #[error("confirmation of {tx_hash} timed out after {polls} polls")]
    ConfirmationTimeout { tx_hash: String, polls: u32 },

    /// Settings or secrets could not be loaded.
    #[error("configuration: {0}")]
    Config(String),
}

impl From<AddressError> for RentalError {
    fn from(e: AddressError) -> Self {
        RentalError::Wallet(WalletError::Address(e))
    }
}

impl From<TransactionError> for RentalError {
    fn from(e: TransactionError) -> Self {
        RentalError::Wallet(WalletError::Transaction(e))
    }
}

impl RentalError {
    /// Stable machine-readable error kind, used by the HTTP surface.
    pub fn kind(&self) -> &'static str {
        match self {
            RentalError::Wallet(w) => match w {
                WalletError::InvalidSeedPhrase(_) => "invalid_seed_phrase",
                WalletError::Address(AddressError::UnsupportedNetwork(_)) => "unsupported_network",
                WalletError::InsufficientFunds { .. } | WalletError::InsufficientAsset { .. } => {
                    "insufficient_funds"
                }
                WalletError::ConservationViolation(_) => "conservation_violation",
                _ => "transaction_build",
            },
            RentalError::Gateway(g) => match g {
                GatewayError::ProtocolParametersUnavailable(_) => "protocol_parameters_unavailable",
                GatewayError::ChainTipUnavailable(_) => "chain_tip_unavailable",
                _ => "chain_query_failure",
            },
            RentalError::InvalidTransition { .. } => "invalid_transition",
            RentalError::NotFound(_) => "not_found",
            RentalError::ConfirmationTimeout { .. } => "confirmation_timeout",
            RentalError::Config(_) => "config",
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            RentalError::Gateway(g) => g.is_transient(),
            RentalError::ConfirmationTimeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let cases: Vec<(RentalError, &str)> = vec![
            (WalletError::InvalidSeedPhrase("checksum mismatch").into(), "invalid_seed_phrase"),
            (AddressError::UnsupportedNetwork("devnet".into()).into(), "unsupported_network"),
            (WalletError::InsufficientFunds { have: 1, need: 2 }.into(), "insufficient_funds"),
            (
                WalletError::InsufficientAsset { asset: "ab".into(), have: 0, need: 1 }.into(),
                "insufficient_funds",
            ),
            (WalletError::ConservationViolation("x".into()).into(), "conservation_violation"),
            (WalletError::NoChangeOutput.into(), "transaction_build"),
            (GatewayError::Timeout.into(), "chain_query_failure"),
            (GatewayError::ProtocolParametersUnavailable("x".into()).into(), "protocol_parameters_unavailable"),
            (GatewayError::ChainTipUnavailable("x".into()).into(), "chain_tip_unavailable"),
            (RentalError::NotFound("lease".into()), "not_found"),
            (RentalError::Config("x".into()), "config"),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn display_invalid_transition() {
        let e = RentalError::InvalidTransition { asset: "abcd".into(), state: "released", action: "lock" };
        assert_eq!(e.to_string(), "cannot lock abcd: lease is released");
        assert_eq!(e.kind(), "invalid_transition");
    }

    #[test]
    fn retryable_follows_gateway_classification() {
        assert!(RentalError::from(GatewayError::RateLimited).is_retryable());
        assert!(!RentalError::from(GatewayError::Http { status: 404 }).is_retryable());
        assert!(!RentalError::from(WalletError::NoChangeOutput).is_retryable());
    }
}
