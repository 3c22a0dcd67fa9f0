//! # primer-x402
//!
//! Pay-per-request HTTP payments over the x402 protocol.
//!
//! A server prices a route; an unpaid request gets HTTP 402 with a payment
//! challenge; the client signs an EIP-712 transfer authorization for the exact
//! amount and retries with an `X-PAYMENT` header; the server settles it
//! through a facilitator and serves the response with a settlement proof
//! attached. No API keys, no accounts, no stored card data.
//!
//! ## Paying
//!
//! ```no_run
//! use primer_x402::{Payer, PaymentSigner};
//!
//! # async fn run() -> primer_x402::Result<()> {
//! let signer = PaymentSigner::from_private_key("0x...", "base")?;
//! let payer = Payer::new(signer)?.with_max_amount("1.00");
//! let response = payer.get("https://api.example.com/api/premium").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Charging
//!
//! ```no_run
//! use primer_x402::{GateOutcome, PaymentGate, RouteConfig};
//!
//! # async fn run() -> primer_x402::Result<()> {
//! let gate = PaymentGate::builder()
//!     .pay_to("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb")
//!     .route("/api/premium", RouteConfig::new("0.01", "base"))
//!     .build()?;
//!
//! match gate.check("/api/premium", None).await? {
//!     GateOutcome::Pass => { /* serve normally */ }
//!     GateOutcome::Challenge { .. } => { /* respond 402 */ }
//!     GateOutcome::Reject { .. } => { /* respond 400 */ }
//!     GateOutcome::Settled { .. } => { /* serve + proof header */ }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Two settlement paths exist per token: EIP-3009 native gasless transfers
//! for tokens that support them (USDC), and a settlement contract with
//! sequential nonces for every other ERC-20. The payer picks automatically.

#![warn(missing_docs)]

pub mod cache;
pub mod eip712;
pub mod errors;
pub mod facilitator;
pub mod network;
pub mod payee;
pub mod payer;
pub mod retry;
pub mod settlement;
pub mod signer;
pub mod tokens;
pub mod types;
pub mod utils;

pub use errors::{Result, X402Error};
pub use facilitator::FacilitatorClient;
pub use network::{NetworkConfig, NetworkRegistry, DEFAULT_FACILITATOR};
pub use payee::{GateOutcome, PaymentGate, PaymentGateBuilder, RouteConfig};
pub use payer::{approve_token, settlement_proof, Payer};
pub use retry::RetryPolicy;
pub use signer::{PaymentSigner, WalletHandle};
pub use types::{
    PaymentPayload, PaymentRequiredResponse, PaymentRequirements, SettlementResult,
    EXACT_SCHEME, PAYMENT_HEADER, PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, X402_VERSION,
};
