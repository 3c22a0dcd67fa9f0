//! Payee-side payment gate: protect routes behind a 402 challenge.
//!
//! [`PaymentGate`] is framework-agnostic. An HTTP layer (axum, actix, raw
//! hyper) feeds it the request path and the raw `X-PAYMENT` header and maps
//! the returned [`GateOutcome`] onto a response. Requirements are always
//! re-derived from the gate's own route configuration, never from values the
//! payer echoed back; a client cannot talk the server into a cheaper price.
//!
//! Settlement failures re-challenge with 402 and an error message. They are
//! never surfaced as a server error: the request simply remains unpaid.

use crate::cache::{MetadataCache, DEFAULT_CACHE_CAPACITY};
use crate::errors::{Result, X402Error};
use crate::facilitator::FacilitatorClient;
use crate::network::{NetworkConfig, NetworkRegistry};
use crate::tokens::token_metadata;
use crate::types::{
    FacilitatorRequest, PaymentPayload, PaymentRequiredResponse, PaymentRequirements,
    SettlementResult, EXACT_SCHEME, X402_VERSION,
};
use crate::utils::{decimal_to_atomic, decode_header_value, encode_header, parse_address};
use ethers::providers::{Http, Provider};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DEFAULT_MAX_TIMEOUT_SECS: u64 = 300;

/// Pricing for one protected route.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Price as a human-readable decimal amount, e.g. `"0.01"`
    pub amount: String,

    /// Network to settle on (canonical id or legacy alias)
    pub network: String,

    /// Token contract address; defaults to the network's USDC
    pub asset: Option<String>,

    /// Shown to the payer in the challenge
    pub description: Option<String>,

    /// How long a signed authorization stays acceptable
    pub max_timeout_seconds: u64,

    /// RPC endpoint for token metadata reads; defaults to the network's
    /// public endpoint
    pub rpc_url: Option<String>,

    /// Settles this route through its own facilitator instead of the gate's
    pub facilitator: Option<FacilitatorClient>,
}

impl RouteConfig {
    /// Creates a route priced at `amount` on `network`, in USDC, with the
    /// default authorization timeout.
    pub fn new(amount: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            network: network.into(),
            asset: None,
            description: None,
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECS,
            rpc_url: None,
            facilitator: None,
        }
    }

    /// Overrides the token contract.
    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    /// Sets the challenge description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Overrides the authorization timeout.
    pub fn with_max_timeout(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    /// Overrides the RPC endpoint used for token metadata reads.
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }

    /// Settles this route through its own facilitator.
    pub fn with_facilitator(mut self, facilitator: FacilitatorClient) -> Self {
        self.facilitator = Some(facilitator);
        self
    }
}

/// What the HTTP layer should do with a request.
#[derive(Debug)]
pub enum GateOutcome {
    /// No protected route matched; serve the request normally.
    Pass,

    /// Respond 402. `header` is the base64 `PAYMENT-REQUIRED` header value,
    /// `body` the same challenge as a JSON body.
    Challenge {
        /// The challenge to serialize as the response body
        body: PaymentRequiredResponse,
        /// Encoded value for the `PAYMENT-REQUIRED` response header
        header: String,
    },

    /// Respond 400: the `X-PAYMENT` header was malformed.
    Reject {
        /// The exact field that failed validation
        field: String,
        /// Why it failed
        reason: String,
    },

    /// Payment settled; serve the request and attach the proof header.
    Settled {
        /// Encoded value for the `X-PAYMENT-RESPONSE` header
        proof_header: String,
        /// The decoded settlement result
        result: SettlementResult,
    },
}

#[derive(Debug)]
struct CompiledRoute {
    pattern: RoutePattern,
    config: RouteConfig,
    network: &'static NetworkConfig,
    asset: String,
    provider: Arc<Provider<Http>>,
}

/// Builder for [`PaymentGate`].
#[derive(Debug, Default)]
pub struct PaymentGateBuilder {
    pay_to: Option<String>,
    routes: Vec<(String, RouteConfig)>,
    facilitator: Option<FacilitatorClient>,
}

impl PaymentGateBuilder {
    /// Sets the recipient address for all routes. Required.
    pub fn pay_to(mut self, address: impl Into<String>) -> Self {
        self.pay_to = Some(address.into());
        self
    }

    /// Protects `pattern` with the given pricing. Patterns match by path
    /// segment: `:name` matches one segment, a trailing `*` matches the rest.
    pub fn route(mut self, pattern: impl Into<String>, config: RouteConfig) -> Self {
        self.routes.push((pattern.into(), config));
        self
    }

    /// Uses a custom facilitator instead of the default one.
    pub fn facilitator(mut self, facilitator: FacilitatorClient) -> Self {
        self.facilitator = Some(facilitator);
        self
    }

    /// Validates the configuration and builds the gate.
    ///
    /// Fails fast on a bad recipient address, an unknown network, an
    /// unparseable pattern, and on any route whose network the default
    /// facilitator cannot settle when no custom facilitator is given.
    pub fn build(self) -> Result<PaymentGate> {
        let pay_to = self.pay_to.ok_or_else(|| X402Error::Config {
            reason: "pay_to address is required".to_string(),
        })?;
        parse_address(&pay_to)?;

        let registry = NetworkRegistry::new();
        let has_custom_facilitator = self.facilitator.is_some();
        let facilitator = match self.facilitator {
            Some(f) => f,
            None => FacilitatorClient::default_facilitator()?,
        };

        let mut routes = Vec::with_capacity(self.routes.len());
        for (pattern, config) in self.routes {
            let network = registry.resolve(&config.network)?;
            if !has_custom_facilitator
                && config.facilitator.is_none()
                && !registry.default_facilitator_supports(network.id)
            {
                return Err(X402Error::Config {
                    reason: format!(
                        "the default facilitator does not settle on {}; configure a custom facilitator for route {}",
                        network.id, pattern
                    ),
                });
            }
            let asset = match &config.asset {
                Some(asset) => {
                    parse_address(asset)?;
                    asset.clone()
                }
                None => network.usdc.to_string(),
            };
            let rpc_url = config.rpc_url.as_deref().unwrap_or(network.rpc_url);
            let provider = Provider::<Http>::try_from(rpc_url)?;
            routes.push(CompiledRoute {
                pattern: RoutePattern::compile(&pattern)?,
                config,
                network,
                asset,
                provider: Arc::new(provider),
            });
        }

        Ok(PaymentGate {
            pay_to,
            routes,
            facilitator,
            metadata_cache: Arc::new(Mutex::new(MetadataCache::new(DEFAULT_CACHE_CAPACITY))),
        })
    }
}

/// Route-level payment enforcement shared by all HTTP adapters.
#[derive(Debug)]
pub struct PaymentGate {
    pay_to: String,
    routes: Vec<CompiledRoute>,
    facilitator: FacilitatorClient,
    metadata_cache: Arc<Mutex<MetadataCache>>,
}

impl PaymentGate {
    /// Starts building a gate.
    pub fn builder() -> PaymentGateBuilder {
        PaymentGateBuilder::default()
    }

    /// Decides what to do with a request.
    ///
    /// `Err` here means the gate itself could not price the route (a chain
    /// read failed); payment and settlement failures always come back as a
    /// [`GateOutcome`], not an error.
    pub async fn check(&self, path: &str, payment_header: Option<&str>) -> Result<GateOutcome> {
        let Some(route) = self.routes.iter().find(|r| r.pattern.matches(path)) else {
            return Ok(GateOutcome::Pass);
        };

        let requirements = self.requirements(route, path).await?;

        let Some(raw_header) = payment_header else {
            debug!(path, "unpaid request, issuing challenge");
            return self.challenge(requirements, None);
        };

        let payload = match parse_payment_header(raw_header, route.network.id) {
            Ok(payload) => payload,
            Err(X402Error::InvalidPaymentHeader { field, reason }) => {
                warn!(path, %field, %reason, "malformed payment header");
                return Ok(GateOutcome::Reject { field, reason });
            }
            Err(other) => return Err(other),
        };

        let request = FacilitatorRequest {
            x402_version: X402_VERSION,
            payment_payload: payload,
            payment_requirements: requirements.clone(),
        };

        let facilitator = route.config.facilitator.as_ref().unwrap_or(&self.facilitator);
        match facilitator.settle(&request).await {
            Ok(result) if result.success => {
                info!(
                    path,
                    transaction = result.transaction.as_deref().unwrap_or("<none>"),
                    "payment settled"
                );
                Ok(GateOutcome::Settled {
                    proof_header: encode_header(&result)?,
                    result,
                })
            }
            Ok(result) => {
                let reason = result
                    .error
                    .unwrap_or_else(|| "settlement failed".to_string());
                warn!(path, %reason, "settlement rejected, re-challenging");
                self.challenge(requirements, Some(reason))
            }
            Err(e) => {
                let reason = if e.is_retryable() {
                    format!("{} (retryable)", e)
                } else {
                    e.to_string()
                };
                warn!(path, %reason, "settlement errored, re-challenging");
                self.challenge(requirements, Some(reason))
            }
        }
    }

    fn challenge(
        &self,
        requirements: PaymentRequirements,
        error: Option<String>,
    ) -> Result<GateOutcome> {
        let body = PaymentRequiredResponse {
            x402_version: X402_VERSION,
            accepts: vec![requirements],
            error,
        };
        let header = encode_header(&body)?;
        Ok(GateOutcome::Challenge { body, header })
    }

    // Requirements come from the gate's own configuration plus on-chain token
    // metadata; nothing is taken from the inbound request but the path.
    async fn requirements(
        &self,
        route: &CompiledRoute,
        path: &str,
    ) -> Result<PaymentRequirements> {
        let token = parse_address(&route.asset)?;
        let metadata = token_metadata(
            Arc::clone(&route.provider),
            route.network.id,
            token,
            &self.metadata_cache,
        )
        .await?;
        let atomic = decimal_to_atomic(&route.config.amount, metadata.decimals)?;

        Ok(PaymentRequirements {
            scheme: EXACT_SCHEME.to_string(),
            network: route.network.id.to_string(),
            max_amount_required: atomic.to_string(),
            resource: path.to_string(),
            description: route.config.description.clone(),
            pay_to: self.pay_to.clone(),
            max_timeout_seconds: route.config.max_timeout_seconds,
            asset: route.asset.clone(),
            extra: Some(json!({
                "name": metadata.name,
                "version": metadata.version,
            })),
        })
    }
}

// Validates the X-PAYMENT header field by field so the rejection names the
// exact offender, then deserializes it.
fn parse_payment_header(raw: &str, expected_network: &str) -> Result<PaymentPayload> {
    let reject = |field: &str, reason: &str| X402Error::InvalidPaymentHeader {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let value = decode_header_value(raw)
        .map_err(|e| reject("X-PAYMENT", &format!("not base64-encoded JSON: {}", e)))?;

    let version = value
        .get("x402Version")
        .ok_or_else(|| reject("x402Version", "missing"))?
        .as_u64()
        .ok_or_else(|| reject("x402Version", "must be a number"))?;
    if version != X402_VERSION as u64 {
        return Err(reject("x402Version", &format!("unsupported version {}", version)));
    }

    let scheme = value
        .get("scheme")
        .and_then(Value::as_str)
        .ok_or_else(|| reject("scheme", "missing"))?;
    if scheme != EXACT_SCHEME {
        return Err(reject("scheme", &format!("unsupported scheme `{}`", scheme)));
    }

    let network = value
        .get("network")
        .and_then(Value::as_str)
        .ok_or_else(|| reject("network", "missing"))?;
    let canonical = NetworkRegistry::new()
        .canonicalize(network)
        .map_err(|_| reject("network", &format!("unknown network `{}`", network)))?;
    if canonical != expected_network {
        return Err(reject(
            "network",
            &format!("payment is on {} but this route settles on {}", canonical, expected_network),
        ));
    }

    let payload = value
        .get("payload")
        .and_then(Value::as_object)
        .ok_or_else(|| reject("payload", "missing or not an object"))?;

    let signature = payload
        .get("signature")
        .and_then(Value::as_str)
        .ok_or_else(|| reject("payload.signature", "missing"))?;
    if !signature.starts_with("0x") || signature.len() <= 2 {
        return Err(reject("payload.signature", "must be 0x-prefixed hex"));
    }

    let authorization = payload
        .get("authorization")
        .and_then(Value::as_object)
        .ok_or_else(|| reject("payload.authorization", "missing or not an object"))?;

    for field in ["from", "to", "value", "validAfter", "validBefore", "nonce"] {
        if authorization.get(field).and_then(Value::as_str).is_none() {
            return Err(reject(
                &format!("payload.authorization.{}", field),
                "missing or not a string",
            ));
        }
    }

    serde_json::from_value(value)
        .map_err(|e| reject("X-PAYMENT", &format!("malformed payload: {}", e)))
}

#[derive(Debug)]
struct RoutePattern {
    segments: Vec<Segment>,
}

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    Wildcard,
}

impl RoutePattern {
    fn compile(pattern: &str) -> Result<Self> {
        let raw: Vec<&str> = pattern.trim_matches('/').split('/').collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            let segment = match *part {
                "*" => {
                    if i != raw.len() - 1 {
                        return Err(X402Error::Config {
                            reason: format!("wildcard must be the last segment in `{}`", pattern),
                        });
                    }
                    Segment::Wildcard
                }
                p if p.starts_with(':') => Segment::Param,
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        let mut parts_iter = parts.iter();
        for segment in &self.segments {
            match segment {
                // Trailing wildcard swallows the rest, including nothing.
                Segment::Wildcard => {
                    return parts.len() >= self.segments.len() - 1;
                }
                Segment::Param => {
                    if parts_iter.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(expected) => match parts_iter.next() {
                    Some(part) if *part == expected => {}
                    _ => return false,
                },
            }
        }
        parts_iter.next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExactPayload, TransferAuthorization};

    const PAY_TO: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb";

    fn valid_header() -> String {
        let payload = PaymentPayload {
            x402_version: X402_VERSION,
            scheme: EXACT_SCHEME.to_string(),
            network: "eip155:8453".to_string(),
            payload: ExactPayload {
                signature: "0xabcdef".to_string(),
                authorization: TransferAuthorization {
                    from: "0x1111111111111111111111111111111111111111".to_string(),
                    to: PAY_TO.to_string(),
                    value: "10000".to_string(),
                    valid_after: "0".to_string(),
                    valid_before: "9999999999".to_string(),
                    nonce: "0".to_string(),
                },
            },
        };
        encode_header(&payload).unwrap()
    }

    #[test]
    fn test_pattern_matching() {
        let exact = RoutePattern::compile("/api/premium").unwrap();
        assert!(exact.matches("/api/premium"));
        assert!(exact.matches("api/premium/"));
        assert!(!exact.matches("/api/premium/extra"));
        assert!(!exact.matches("/api"));

        let param = RoutePattern::compile("/api/users/:id").unwrap();
        assert!(param.matches("/api/users/42"));
        assert!(!param.matches("/api/users"));
        assert!(!param.matches("/api/users/42/posts"));

        let wild = RoutePattern::compile("/api/premium/*").unwrap();
        assert!(wild.matches("/api/premium"));
        assert!(wild.matches("/api/premium/a"));
        assert!(wild.matches("/api/premium/a/b/c"));
        assert!(!wild.matches("/api/other"));
    }

    #[test]
    fn test_interior_wildcard_rejected() {
        let err = RoutePattern::compile("/api/*/premium").unwrap_err();
        assert!(matches!(err, X402Error::Config { .. }));
    }

    #[test]
    fn test_builder_requires_pay_to() {
        let err = PaymentGate::builder()
            .route("/api/premium", RouteConfig::new("0.01", "base"))
            .build()
            .unwrap_err();
        assert!(matches!(err, X402Error::Config { .. }));
    }

    #[test]
    fn test_builder_rejects_bad_pay_to() {
        let err = PaymentGate::builder()
            .pay_to("not-an-address")
            .build()
            .unwrap_err();
        assert!(matches!(err, X402Error::InvalidAddress { .. }));
    }

    #[test]
    fn test_builder_rejects_unsupported_network_without_custom_facilitator() {
        let err = PaymentGate::builder()
            .pay_to(PAY_TO)
            .route("/api/premium", RouteConfig::new("0.01", "polygon"))
            .build()
            .unwrap_err();
        assert!(matches!(err, X402Error::Config { .. }));
    }

    #[test]
    fn test_builder_accepts_unsupported_network_with_custom_facilitator() {
        let facilitator = FacilitatorClient::new("https://facilitator.example").unwrap();
        let gate = PaymentGate::builder()
            .pay_to(PAY_TO)
            .route("/api/premium", RouteConfig::new("0.01", "polygon"))
            .facilitator(facilitator)
            .build();
        assert!(gate.is_ok());
    }

    #[test]
    fn test_builder_accepts_unsupported_network_with_route_facilitator() {
        let facilitator = FacilitatorClient::new("https://facilitator.example").unwrap();
        let gate = PaymentGate::builder()
            .pay_to(PAY_TO)
            .route(
                "/api/premium",
                RouteConfig::new("0.01", "polygon").with_facilitator(facilitator),
            )
            .build();
        assert!(gate.is_ok());
    }

    #[tokio::test]
    async fn test_unprotected_path_passes() {
        let gate = PaymentGate::builder()
            .pay_to(PAY_TO)
            .route("/api/premium", RouteConfig::new("0.01", "base"))
            .build()
            .unwrap();
        let outcome = gate.check("/api/free", None).await.unwrap();
        assert!(matches!(outcome, GateOutcome::Pass));
    }

    #[test]
    fn test_parse_payment_header_accepts_valid() {
        let payload = parse_payment_header(&valid_header(), "eip155:8453").unwrap();
        assert_eq!(payload.scheme, EXACT_SCHEME);
        assert_eq!(payload.payload.authorization.value, "10000");
    }

    fn decoded(header: &str) -> Value {
        serde_json::from_slice(
            &base64::Engine::decode(&base64::engine::general_purpose::STANDARD, header).unwrap(),
        )
        .unwrap()
    }

    fn reencode(value: &Value) -> String {
        base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            serde_json::to_string(value).unwrap(),
        )
    }

    #[test]
    fn test_validation_names_each_missing_field() {
        let fields = [
            "x402Version",
            "scheme",
            "network",
            "payload",
            "payload.signature",
            "payload.authorization",
            "payload.authorization.from",
            "payload.authorization.to",
            "payload.authorization.value",
            "payload.authorization.validAfter",
            "payload.authorization.validBefore",
            "payload.authorization.nonce",
        ];
        for field in fields {
            let mut value = decoded(&valid_header());
            let parts: Vec<&str> = field.split('.').collect();
            let mut target = &mut value;
            for part in &parts[..parts.len() - 1] {
                target = &mut target[*part];
            }
            target
                .as_object_mut()
                .unwrap()
                .remove(*parts.last().unwrap());

            let err = parse_payment_header(&reencode(&value), "eip155:8453").unwrap_err();
            match err {
                X402Error::InvalidPaymentHeader { field: named, .. } => {
                    assert_eq!(named, field, "wrong field named for missing {field}");
                }
                other => panic!("unexpected error for missing {field}: {other}"),
            }
        }
    }

    #[test]
    fn test_parse_payment_header_rejects_network_mismatch() {
        let err = parse_payment_header(&valid_header(), "eip155:84532").unwrap_err();
        match err {
            X402Error::InvalidPaymentHeader { field, .. } => assert_eq!(field, "network"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_payment_header_rejects_garbage() {
        let err = parse_payment_header("!!!", "eip155:8453").unwrap_err();
        assert!(matches!(err, X402Error::InvalidPaymentHeader { .. }));
    }
}
