//! Error types shared by the rental crates.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("bech32: {0}")] Bech32(String),
    #[error("unknown HRP: {0}")] UnknownHrp(String),
    #[error("HRP {hrp} does not match address header")] HrpMismatch { hrp: String },
    #[error("invalid length: expected {expected}, got {got}")] InvalidLength { expected: usize, got: usize },
    #[error("unsupported address type: {0:#x}")] UnsupportedAddressType(u8),
    #[error("unsupported network: {0}")] UnsupportedNetwork(String),
    #[error("empty address")] Empty,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error("invalid hash length: expected {expected}, got {got}")] InvalidHashLength { expected: usize, got: usize },
    #[error("asset name too long: {0} bytes")] AssetNameTooLong(usize),
    #[error("invalid asset id: {0}")] InvalidAssetId(String),
    #[error("invalid outpoint: {0}")] InvalidOutPoint(String),
    #[error("value overflow")] ValueOverflow,
    #[error("CBOR serialization: {0}")] Serialization(String),
}

/// Failures of the chain-query gateway.
///
/// Transport-level failures are classified by [`GatewayError::is_transient`]
/// so the gateway can retry them; `ProtocolParametersUnavailable` and
/// `ChainTipUnavailable` are surfaced after the retry budget is spent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("request timed out")] Timeout,
    #[error("rate limited by indexer")] RateLimited,
    #[error("HTTP status {status}")] Http { status: u16 },
    #[error("transport: {0}")] Transport(String),
    #[error("decode: {0}")] Decode(String),
    #[error("protocol parameters unavailable: {0}")] ProtocolParametersUnavailable(String),
    #[error("chain tip unavailable: {0}")] ChainTipUnavailable(String),
}

impl GatewayError {
    /// Whether a repeat of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimited | Self::Transport(_) => true,
            Self::Http { status } => *status >= 500,
            Self::ProtocolParametersUnavailable(_) | Self::ChainTipUnavailable(_) => true,
            Self::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(GatewayError::Timeout.is_transient());
        assert!(GatewayError::RateLimited.is_transient());
        assert!(GatewayError::Http { status: 503 }.is_transient());
        assert!(!GatewayError::Http { status: 400 }.is_transient());
        assert!(!GatewayError::Http { status: 404 }.is_transient());
        assert!(!GatewayError::Decode("bad".into()).is_transient());
    }

    #[test]
    fn display_gateway_errors() {
        assert_eq!(GatewayError::Http { status: 502 }.to_string(), "HTTP status 502");
        assert_eq!(
            GatewayError::ChainTipUnavailable("timeout".into()).to_string(),
            "chain tip unavailable: timeout"
        );
    }

    #[test]
    fn display_address_type() {
        assert_eq!(
            AddressError::UnsupportedAddressType(0x70).to_string(),
            "unsupported address type: 0x70"
        );
    }
}
