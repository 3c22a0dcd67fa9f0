//! Core type definitions for the x402 payment handshake.
//!
//! Wire shapes for the 402 challenge, the `X-PAYMENT` header payload, and the
//! facilitator's `/verify`, `/settle`, `/contracts` and `/supported` bodies.
//! Field names follow the protocol's camelCase convention via serde renames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Version of the x402 protocol.
pub const X402_VERSION: u32 = 1;

/// Request header carrying the base64-encoded [`PaymentPayload`].
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// 402 response header carrying the base64-encoded [`PaymentRequiredResponse`].
pub const PAYMENT_REQUIRED_HEADER: &str = "PAYMENT-REQUIRED";

/// Response header carrying the base64-encoded [`SettlementResult`] proof.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// The only payment scheme this crate implements.
pub const EXACT_SCHEME: &str = "exact";

/// Body of an HTTP 402 response: the payment options a payer may satisfy.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentRequiredResponse {
    /// Protocol version (currently 1)
    #[serde(rename = "x402Version")]
    pub x402_version: u32,

    /// List of accepted payment requirements
    pub accepts: Vec<PaymentRequirements>,

    /// Optional error message (set when re-challenging after a failed settlement)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Describes the payment a payee requires for a specific resource.
///
/// Constructed fresh per request from the payee's route configuration and the
/// token's on-chain metadata; never persisted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequirements {
    /// Payment scheme; this crate only produces and accepts `"exact"`
    pub scheme: String,

    /// Network identifier, canonical CAIP-2 form (e.g. `eip155:8453`)
    pub network: String,

    /// Amount required in atomic token units, as a decimal integer string
    #[serde(rename = "maxAmountRequired")]
    pub max_amount_required: String,

    /// The resource path or URL this requirement protects
    pub resource: String,

    /// Human-readable description of what the payment is for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Recipient address
    #[serde(rename = "payTo")]
    pub pay_to: String,

    /// Maximum seconds the signed authorization stays valid
    #[serde(rename = "maxTimeoutSeconds")]
    pub max_timeout_seconds: u64,

    /// Token contract address
    pub asset: String,

    /// Token metadata for the EIP-712 signing domain,
    /// e.g. `{"name": "USD Coin", "version": "2"}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Payment payload sent by the payer in the `X-PAYMENT` header (base64 JSON).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentPayload {
    /// Protocol version
    #[serde(rename = "x402Version")]
    pub x402_version: u32,

    /// Payment scheme used
    pub scheme: String,

    /// Network identifier
    pub network: String,

    /// The signed authorization
    pub payload: ExactPayload,
}

/// Payload body for the `"exact"` scheme: a signature over an authorization.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExactPayload {
    /// 65-byte EIP-712 signature, `0x`-prefixed hex
    pub signature: String,

    /// The authorization the signature covers
    pub authorization: TransferAuthorization,
}

/// A signed transfer authorization.
///
/// For native-gasless tokens `nonce` is a random 32-byte value in hex; for
/// proxy-settled tokens it is the settlement contract's sequential counter as
/// a decimal string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransferAuthorization {
    /// Address of the payer (token holder)
    pub from: String,

    /// Address of the payee
    pub to: String,

    /// Amount to transfer in atomic units (uint256 as string)
    pub value: String,

    /// Unix seconds after which the authorization is valid
    #[serde(rename = "validAfter")]
    pub valid_after: String,

    /// Unix seconds before which the authorization is valid
    #[serde(rename = "validBefore")]
    pub valid_before: String,

    /// Replay-protection nonce
    pub nonce: String,
}

/// Body of `POST /verify` and `POST /settle` to the facilitator.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FacilitatorRequest {
    /// Protocol version
    #[serde(rename = "x402Version")]
    pub x402_version: u32,

    /// The payer's decoded payment payload
    #[serde(rename = "paymentPayload")]
    pub payment_payload: PaymentPayload,

    /// The payee's requirements, re-derived from its own route config
    #[serde(rename = "paymentRequirements")]
    pub payment_requirements: PaymentRequirements,
}

/// Response from the facilitator's `/verify` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerifyResponse {
    /// Whether the payment payload is valid
    #[serde(rename = "isValid")]
    pub is_valid: bool,

    /// Reason if invalid
    #[serde(rename = "invalidReason", skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

/// Outcome of a settlement, produced by the facilitator.
///
/// Attached to the final HTTP response as the `X-PAYMENT-RESPONSE` proof
/// header. The payee trusts this result's success flag; it does not re-verify
/// the raw signature (the facilitator is the trust boundary).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SettlementResult {
    /// Whether funds moved
    pub success: bool,

    /// Transaction reference (hash) when successful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,

    /// Network the settlement ran on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Payer address recovered by the facilitator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,

    /// Failure reason when unsuccessful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of the facilitator's `GET /contracts` map.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContractInfo {
    /// Settlement (proxy) contract address on that network
    pub address: String,

    /// Contract version string
    pub version: String,
}

/// Response from `GET /contracts`: network id → deployed settlement contract.
pub type ContractsResponse = HashMap<String, ContractInfo>;

/// A supported (scheme, network) combination from `GET /supported`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SupportedKind {
    /// Payment scheme
    pub scheme: String,

    /// Network identifier
    pub network: String,
}

/// Response from the facilitator's `GET /supported` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SupportedResponse {
    /// List of supported payment kinds
    pub supported: Vec<SupportedKind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payment_required_response_serialization() {
        let response = PaymentRequiredResponse {
            x402_version: 1,
            accepts: vec![PaymentRequirements {
                scheme: EXACT_SCHEME.to_string(),
                network: "eip155:8453".to_string(),
                max_amount_required: "10000".to_string(),
                resource: "/api/premium".to_string(),
                description: Some("Premium API access".to_string()),
                pay_to: "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb".to_string(),
                max_timeout_seconds: 300,
                asset: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
                extra: Some(json!({"name": "USD Coin", "version": "2"})),
            }],
            error: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("x402Version"));
        assert!(json.contains("maxAmountRequired"));
        assert!(!json.contains("error"));

        let deserialized: PaymentRequiredResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.x402_version, 1);
        assert_eq!(deserialized.accepts.len(), 1);
        assert_eq!(deserialized.accepts[0].network, "eip155:8453");
    }

    #[test]
    fn test_payment_payload_round_trip() {
        let payload = PaymentPayload {
            x402_version: 1,
            scheme: EXACT_SCHEME.to_string(),
            network: "eip155:8453".to_string(),
            payload: ExactPayload {
                signature: "0xabcd".to_string(),
                authorization: TransferAuthorization {
                    from: "0x1111111111111111111111111111111111111111".to_string(),
                    to: "0x2222222222222222222222222222222222222222".to_string(),
                    value: "10000".to_string(),
                    valid_after: "0".to_string(),
                    valid_before: "9999999999".to_string(),
                    nonce: "0".to_string(),
                },
            },
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("validAfter"));
        assert!(json.contains("validBefore"));

        let back: PaymentPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.payload.authorization, payload.payload.authorization);
    }

    #[test]
    fn test_settlement_result_omits_empty_fields() {
        let result = SettlementResult {
            success: true,
            transaction: Some("0xdeadbeef".to_string()),
            network: Some("eip155:8453".to_string()),
            payer: None,
            error: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("transaction"));
        assert!(!json.contains("payer"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_contracts_response_shape() {
        let body = r#"{"eip155:8453":{"address":"0x00000000000000000000000000000000000000aa","version":"1"}}"#;
        let contracts: ContractsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(contracts["eip155:8453"].version, "1");
    }
}
