//! Payer-side client: intercepts HTTP 402 challenges and pays them.
//!
//! [`Payer`] wraps a [`reqwest::Client`]. A request that comes back 402 is
//! parsed as a payment challenge, the first accepted requirement is priced
//! against the configured ceiling, an EIP-712 authorization is signed over
//! whichever path the token supports (native gasless or settlement contract),
//! and the original request is resent verbatim with the `X-PAYMENT` header
//! attached. Anything other than 402 passes through untouched.

use crate::cache::{MetadataCache, TokenMetadata, DEFAULT_CACHE_CAPACITY};
use crate::eip712::{
    erc20_payment_digest, random_nonce, signature_to_hex, transfer_authorization_digest,
};
use crate::errors::{Result, X402Error};
use crate::facilitator::FacilitatorClient;
use crate::network::NetworkRegistry;
use crate::settlement::next_payment_nonce;
use crate::signer::PaymentSigner;
use crate::tokens::{allowance, supports_native_authorization, token_metadata, Erc20Token};
use crate::types::{
    ExactPayload, FacilitatorRequest, PaymentPayload, PaymentRequiredResponse,
    PaymentRequirements, SettlementResult, TransferAuthorization, EXACT_SCHEME, PAYMENT_HEADER,
    PAYMENT_RESPONSE_HEADER, X402_VERSION,
};
use crate::utils::{
    atomic_to_decimal, current_timestamp, decimal_to_atomic, decode_header, encode_header,
    parse_address, string_to_u256,
};
use ethers::middleware::SignerMiddleware;
use ethers::types::{Address, U256};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

// Backdating absorbs clock skew between payer and verifier.
const VALID_AFTER_SKEW_SECS: u64 = 60;

/// HTTP client that satisfies 402 payment challenges automatically.
#[derive(Debug)]
pub struct Payer {
    signer: PaymentSigner,
    facilitator: FacilitatorClient,
    http: Client,
    max_amount: Option<String>,
    verify_first: bool,
    metadata_cache: Arc<Mutex<MetadataCache>>,
}

impl Payer {
    /// Creates a payer using the default facilitator and no spending ceiling.
    pub fn new(signer: PaymentSigner) -> Result<Self> {
        Ok(Self {
            signer,
            facilitator: FacilitatorClient::default_facilitator()?,
            http: Client::new(),
            max_amount: None,
            verify_first: true,
            metadata_cache: Arc::new(Mutex::new(MetadataCache::new(DEFAULT_CACHE_CAPACITY))),
        })
    }

    /// Uses a custom facilitator.
    pub fn with_facilitator(mut self, facilitator: FacilitatorClient) -> Self {
        self.facilitator = facilitator;
        self
    }

    /// Sets a per-payment ceiling as a human-readable decimal amount
    /// (e.g. `"1.50"`). Challenges above it fail with
    /// [`X402Error::AmountExceedsMax`]; there is no override.
    pub fn with_max_amount(mut self, max_amount: impl Into<String>) -> Self {
        self.max_amount = Some(max_amount.into());
        self
    }

    /// Skips the pre-flight facilitator `/verify` call (on by default).
    pub fn with_verify_first(mut self, verify_first: bool) -> Self {
        self.verify_first = verify_first;
        self
    }

    /// The payer address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// GET with automatic payment.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(Method::GET, url, None).await
    }

    /// POST a JSON body with automatic payment.
    pub async fn post(&self, url: &str, body: Value) -> Result<Response> {
        self.request(Method::POST, url, Some(body)).await
    }

    /// Sends a request, transparently paying one 402 challenge if the server
    /// issues one. The retried request is identical to the original apart from
    /// the added `X-PAYMENT` header.
    pub async fn request(&self, method: Method, url: &str, body: Option<Value>) -> Result<Response> {
        let initial = self
            .build_request(method.clone(), url, body.as_ref(), None)
            .send()
            .await?;

        if initial.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(initial);
        }
        debug!(url, "received 402 payment challenge");

        let bytes = initial.bytes().await?;
        let challenge: PaymentRequiredResponse =
            serde_json::from_slice(&bytes).map_err(|e| X402Error::InvalidResponse {
                reason: format!("cannot parse 402 body: {}", e),
            })?;

        let payment_header = self.build_payment(&challenge).await?;

        let response = self
            .build_request(method, url, body.as_ref(), Some(&payment_header))
            .send()
            .await?;

        if let Some(proof) = settlement_proof(&response)? {
            info!(
                transaction = proof.transaction.as_deref().unwrap_or("<none>"),
                network = proof.network.as_deref().unwrap_or("<none>"),
                success = proof.success,
                "settlement proof received"
            );
        }
        Ok(response)
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        payment: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(header) = payment {
            request = request.header(PAYMENT_HEADER, header);
        }
        request
    }

    // Challenge → signed, encoded X-PAYMENT header value.
    async fn build_payment(&self, challenge: &PaymentRequiredResponse) -> Result<String> {
        let requirement = select_requirement(challenge, self.signer.network().id)?;

        let token = parse_address(&requirement.asset)?;
        let pay_to = parse_address(&requirement.pay_to)?;
        let from = self.signer.address();
        let value = string_to_u256(&requirement.max_amount_required)?;
        let provider = self.signer.provider();

        let metadata = token_metadata(
            Arc::clone(&provider),
            self.signer.network().id,
            token,
            &self.metadata_cache,
        )
        .await?;

        if let Some(limit) = &self.max_amount {
            enforce_cap(value, limit, metadata.decimals, &requirement.asset)?;
        }

        let (valid_after, valid_before) =
            validity_window(current_timestamp(), requirement.max_timeout_seconds);

        let (signature, nonce) =
            if supports_native_authorization(Arc::clone(&provider), token).await? {
                let (name, version) = signing_domain_fields(requirement, &metadata);
                let nonce = random_nonce();
                let digest = transfer_authorization_digest(
                    &name,
                    &version,
                    self.signer.chain_id(),
                    token,
                    from,
                    pay_to,
                    value,
                    valid_after,
                    valid_before,
                    nonce,
                );
                debug!(token = ?token, "signing native gasless authorization");
                let signature = self.signer.sign_digest(digest).await?;
                (signature, format!("0x{}", hex::encode(nonce.as_bytes())))
            } else {
                let contracts = self.facilitator.contracts().await?;
                let info = contracts.get(self.signer.network().id).ok_or_else(|| {
                    X402Error::Config {
                        reason: format!(
                            "facilitator has no settlement contract on {}",
                            self.signer.network().id
                        ),
                    }
                })?;
                let proxy = parse_address(&info.address)?;

                let current = allowance(Arc::clone(&provider), token, from, proxy).await?;
                if current < value {
                    return Err(X402Error::InsufficientAllowance {
                        required: value.to_string(),
                        current: current.to_string(),
                        token: requirement.asset.clone(),
                        spender: info.address.clone(),
                    });
                }

                // Fetched immediately before signing; a concurrent payment can
                // still consume it first, which settles as a clean rejection.
                let nonce = next_payment_nonce(Arc::clone(&provider), proxy, from, token).await?;
                let digest = erc20_payment_digest(
                    self.signer.chain_id(),
                    proxy,
                    token,
                    from,
                    pay_to,
                    value,
                    nonce,
                    valid_after,
                    valid_before,
                );
                debug!(token = ?token, proxy = ?proxy, %nonce, "signing settlement contract authorization");
                let signature = self.signer.sign_digest(digest).await?;
                (signature, nonce.to_string())
            };

        let payload = PaymentPayload {
            x402_version: X402_VERSION,
            scheme: EXACT_SCHEME.to_string(),
            network: self.signer.network().id.to_string(),
            payload: ExactPayload {
                signature: signature_to_hex(&signature),
                authorization: TransferAuthorization {
                    from: format!("{:?}", from),
                    to: format!("{:?}", pay_to),
                    value: value.to_string(),
                    valid_after: valid_after.to_string(),
                    valid_before: valid_before.to_string(),
                    nonce,
                },
            },
        };

        if self.verify_first {
            let request = FacilitatorRequest {
                x402_version: X402_VERSION,
                payment_payload: payload.clone(),
                payment_requirements: requirement.clone(),
            };
            let verdict = self.facilitator.verify(&request).await?;
            if !verdict.is_valid {
                return Err(X402Error::VerificationFailed {
                    reason: verdict
                        .invalid_reason
                        .unwrap_or_else(|| "facilitator rejected payment".to_string()),
                });
            }
        }

        encode_header(&payload)
    }
}

/// Decodes the `X-PAYMENT-RESPONSE` settlement proof from a response, if
/// the server attached one.
pub fn settlement_proof(response: &Response) -> Result<Option<SettlementResult>> {
    let Some(raw) = response.headers().get(PAYMENT_RESPONSE_HEADER) else {
        return Ok(None);
    };
    let encoded = raw.to_str().map_err(|e| X402Error::InvalidResponse {
        reason: format!("settlement proof header is not ASCII: {}", e),
    })?;
    Ok(Some(decode_header(encoded)?))
}

/// Submits an ERC-20 `approve(spender, amount)` so the settlement contract can
/// move the payer's tokens. One-time setup for proxy-settled tokens; returns
/// the transaction hash.
pub async fn approve_token(
    signer: &PaymentSigner,
    token: Address,
    spender: Address,
    amount: U256,
) -> Result<String> {
    let wallet = match signer {
        PaymentSigner::Key { wallet, .. } => wallet.clone(),
        PaymentSigner::External { .. } => {
            return Err(X402Error::Config {
                reason: "token approval requires a key-backed signer".to_string(),
            })
        }
    };

    let provider = signer.provider();
    let middleware = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));
    let contract = Erc20Token::new(token, middleware);

    let call = contract.approve(spender, amount);
    let pending = call.send().await.map_err(|e| X402Error::Blockchain {
        reason: format!("approve() failed for {:?}: {}", token, e),
    })?;
    let tx_hash = *pending;
    pending.await?;

    info!(token = ?token, spender = ?spender, %amount, tx = ?tx_hash, "token approval confirmed");
    Ok(format!("{:?}", tx_hash))
}

// Picks and validates the requirement the payer will satisfy. Only the first
// entry of `accepts` is considered.
fn select_requirement<'a>(
    challenge: &'a PaymentRequiredResponse,
    network_id: &str,
) -> Result<&'a PaymentRequirements> {
    if challenge.x402_version != X402_VERSION {
        return Err(X402Error::InvalidResponse {
            reason: format!("unsupported x402Version {}", challenge.x402_version),
        });
    }
    let requirement = challenge
        .accepts
        .first()
        .ok_or_else(|| X402Error::InvalidResponse {
            reason: "accepts list is empty".to_string(),
        })?;
    if requirement.scheme != EXACT_SCHEME {
        return Err(X402Error::UnsupportedScheme {
            scheme: requirement.scheme.clone(),
        });
    }
    let canonical = NetworkRegistry::new().canonicalize(&requirement.network)?;
    if canonical != network_id {
        return Err(X402Error::Config {
            reason: format!(
                "signer is configured for {} but the server requires {}",
                network_id, canonical
            ),
        });
    }
    Ok(requirement)
}

// The timeout comes from the counterparty's challenge; the sum is computed in
// U256 so an absurd value cannot overflow, only produce a far-future bound.
fn validity_window(now: u64, max_timeout_seconds: u64) -> (U256, U256) {
    let valid_after = U256::from(now.saturating_sub(VALID_AFTER_SKEW_SECS));
    let valid_before = U256::from(now) + U256::from(max_timeout_seconds);
    (valid_after, valid_before)
}

// Required amount vs. the payer's decimal ceiling, compared in atomic units.
fn enforce_cap(required: U256, limit: &str, decimals: u8, asset: &str) -> Result<()> {
    let limit_atomic = decimal_to_atomic(limit, decimals)?;
    if required > limit_atomic {
        return Err(X402Error::AmountExceedsMax {
            required: atomic_to_decimal(required, decimals),
            limit: limit.to_string(),
            asset: asset.to_string(),
        });
    }
    Ok(())
}

// EIP-712 domain name/version for the native path: the server's `extra` hint
// wins, on-chain metadata fills the gaps.
fn signing_domain_fields(
    requirement: &PaymentRequirements,
    metadata: &TokenMetadata,
) -> (String, String) {
    let extra = requirement.extra.as_ref();
    let name = extra
        .and_then(|e| e.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or(&metadata.name)
        .to_string();
    let version = extra
        .and_then(|e| e.get("version"))
        .and_then(|v| v.as_str())
        .unwrap_or(&metadata.version)
        .to_string();
    (name, version)
}
