//! Error types for the primer-x402 library.
//!
//! Every failure mode carries a discriminated kind plus structured details so
//! callers can branch programmatically instead of parsing message strings.
//! Anything that touches money (amount caps, allowances, nonces, signatures)
//! surfaces immediately and is never auto-corrected; transient network
//! conditions are classified retryable and handled by [`crate::retry`].

use std::time::Duration;
use thiserror::Error;

/// Main error type for x402 operations.
#[derive(Error, Debug)]
pub enum X402Error {
    /// Bad network id, address, or missing required route fields. Fatal at setup.
    #[error("configuration error: {reason}")]
    Config {
        /// What was misconfigured
        reason: String,
    },

    /// A counterparty returned a malformed 402 response.
    #[error("invalid 402 response: {reason}")]
    InvalidResponse {
        /// What was missing or malformed
        reason: String,
    },

    /// The server asked for more than the payer's declared ceiling.
    /// Mandatory policy check with no override.
    #[error("required amount {required} {asset} exceeds payer limit {limit}")]
    AmountExceedsMax {
        /// Human-readable amount the server required
        required: String,
        /// The payer's configured ceiling
        limit: String,
        /// Token contract address
        asset: String,
    },

    /// The proxy contract is not approved to move enough of the payer's tokens.
    #[error(
        "insufficient allowance for {token}: have {current}, need {required}; \
         approve spender {spender} first (see `approve_token`)"
    )]
    InsufficientAllowance {
        /// Atomic units required by the payment
        required: String,
        /// Atomic units currently approved
        current: String,
        /// Token contract address
        token: String,
        /// The settlement contract that must be approved
        spender: String,
    },

    /// Payee-side rejection of an inbound `X-PAYMENT` header. Maps to HTTP 400.
    #[error("invalid payment header: field `{field}`: {reason}")]
    InvalidPaymentHeader {
        /// The exact field that failed validation
        field: String,
        /// Why it failed
        reason: String,
    },

    /// A facilitator call exceeded its hard request timeout. Retryable.
    #[error("facilitator timeout after {timeout:?} calling {endpoint}")]
    FacilitatorTimeout {
        /// Which facilitator endpoint timed out
        endpoint: String,
        /// The configured hard timeout
        timeout: Duration,
    },

    /// Error during HTTP request/response handling.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error during JSON serialization/deserialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error during Base64 encoding/decoding.
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Error parsing a URL.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Error during blockchain reads or broadcasts.
    #[error("blockchain error: {reason}")]
    Blockchain {
        /// Provider or contract-call failure detail
        reason: String,
    },

    /// Signing or signature recovery failed.
    #[error("signature error: {reason}")]
    Signature {
        /// Underlying signing failure
        reason: String,
    },

    /// Settlement was attempted and rejected.
    #[error("settlement failed: {reason}")]
    SettlementFailed {
        /// Facilitator- or contract-reported reason
        reason: String,
    },

    /// Pre-flight facilitator verification rejected the payment.
    #[error("verification failed: {reason}")]
    VerificationFailed {
        /// The facilitator's `invalidReason`
        reason: String,
    },

    /// The counterparty offered a payment scheme this crate does not implement.
    #[error("unsupported scheme: {scheme}")]
    UnsupportedScheme {
        /// The offered scheme name
        scheme: String,
    },

    /// A network identifier not present in the registry.
    #[error("unknown network: {network}")]
    UnknownNetwork {
        /// The identifier that failed to resolve
        network: String,
    },

    /// Invalid address format.
    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress {
        /// The rejected input
        address: String,
        /// Parse failure detail
        reason: String,
    },

    /// Invalid or unparseable amount.
    #[error("invalid amount `{amount}`: {reason}")]
    InvalidAmount {
        /// The rejected input
        amount: String,
        /// Parse failure detail
        reason: String,
    },

    /// Sequential nonce did not match the settlement contract's counter.
    /// Replay protection; a clean rejection, never corrected client-side.
    #[error("nonce mismatch: contract expects {expected}, authorization carries {got}")]
    NonceMismatch {
        /// The contract's stored next nonce
        expected: String,
        /// The nonce in the submitted authorization
        got: String,
    },

    /// Caller lacks permission for a settlement-contract operation.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Which permission was missing
        reason: String,
    },

    /// The settlement contract is paused.
    #[error("settlement contract is paused")]
    Paused,

    /// A fee change was executed before its timelock elapsed.
    #[error("timelock not elapsed: fee change activates at {ready_at}")]
    TimelockNotElapsed {
        /// Unix seconds at which the pending change becomes executable
        ready_at: u64,
    },
}

impl X402Error {
    /// Whether this error class is safe to retry with backoff.
    ///
    /// Connection-refused/reset/timeout/DNS failures and HTTP 5xx are
    /// transient; everything touching money is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            X402Error::FacilitatorTimeout { .. } => true,
            X402Error::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// Result type alias for x402 operations.
pub type Result<T> = std::result::Result<T, X402Error>;

impl From<ethers::core::types::SignatureError> for X402Error {
    fn from(err: ethers::core::types::SignatureError) -> Self {
        X402Error::Signature {
            reason: err.to_string(),
        }
    }
}

impl From<ethers::providers::ProviderError> for X402Error {
    fn from(err: ethers::providers::ProviderError) -> Self {
        X402Error::Blockchain {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_field() {
        let err = X402Error::InvalidPaymentHeader {
            field: "payload.signature".to_string(),
            reason: "missing".to_string(),
        };
        assert!(err.to_string().contains("payload.signature"));
    }

    #[test]
    fn test_amount_cap_display() {
        let err = X402Error::AmountExceedsMax {
            required: "100.00".to_string(),
            limit: "1.00".to_string(),
            asset: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("100.00"));
        assert!(msg.contains("1.00"));
    }

    #[test]
    fn test_retryable_classification() {
        let timeout = X402Error::FacilitatorTimeout {
            endpoint: "/settle".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert!(timeout.is_retryable());

        let cap = X402Error::AmountExceedsMax {
            required: "2".to_string(),
            limit: "1".to_string(),
            asset: "0x0".to_string(),
        };
        assert!(!cap.is_retryable());

        let nonce = X402Error::NonceMismatch {
            expected: "3".to_string(),
            got: "2".to_string(),
        };
        assert!(!nonce.is_retryable());
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let x402_err: X402Error = json_err.into();
        assert!(matches!(x402_err, X402Error::Json(_)));
    }
}
