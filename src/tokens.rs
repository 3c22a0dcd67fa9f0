//! ERC-20 token reads: metadata, allowance, and the gasless-capability check.
//!
//! Decimals, name and version are immutable token metadata, so every read
//! goes through the bounded cache first; a miss costs one chain round trip
//! and populates the cache for the process lifetime.

use crate::cache::{MetadataCache, TokenMetadata};
use crate::errors::{Result, X402Error};
use ethers::contract::{abigen, ContractError};
use ethers::providers::{Http, Provider};
use ethers::types::{Address, U256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

abigen!(
    Erc20Token,
    r#"[
        function decimals() external view returns (uint8)
        function name() external view returns (string)
        function version() external view returns (string)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool)
    ]"#
);

// Tokens that predate EIP-5267 commonly omit version(); "1" is the
// conventional fallback ("2" for USDC, which does expose it).
const DEFAULT_TOKEN_VERSION: &str = "1";

/// Fetches decimals/name/version for a token, consulting the cache first.
pub async fn token_metadata(
    provider: Arc<Provider<Http>>,
    network_id: &str,
    token: Address,
    cache: &Mutex<MetadataCache>,
) -> Result<TokenMetadata> {
    let key = (network_id.to_string(), format!("{:?}", token));

    if let Some(hit) = cache.lock().await.get(&key) {
        return Ok(hit);
    }

    let contract = Erc20Token::new(token, provider);

    let decimals = contract
        .decimals()
        .call()
        .await
        .map_err(|e| X402Error::Blockchain {
            reason: format!("decimals() failed for {:?}: {}", token, e),
        })?;

    let name = contract
        .name()
        .call()
        .await
        .map_err(|e| X402Error::Blockchain {
            reason: format!("name() failed for {:?}: {}", token, e),
        })?;

    let version = contract
        .version()
        .call()
        .await
        .unwrap_or_else(|_| DEFAULT_TOKEN_VERSION.to_string());

    let metadata = TokenMetadata {
        decimals,
        name,
        version,
    };
    debug!(token = ?token, network = network_id, ?metadata, "fetched token metadata");

    cache.lock().await.insert(key, metadata.clone());
    Ok(metadata)
}

/// Checks whether a token supports EIP-3009 native gasless transfers.
///
/// A token exposing `authorizationState` settles through its own
/// `transferWithAuthorization` path; a revert or undecodable return means it
/// does not and routes through the settlement contract. Transport failures
/// propagate as [`X402Error::Blockchain`] so an RPC outage is never mistaken
/// for a missing capability.
pub async fn supports_native_authorization(
    provider: Arc<Provider<Http>>,
    token: Address,
) -> Result<bool> {
    let contract = Erc20Token::new(token, provider);
    match contract
        .authorization_state(Address::zero(), [0u8; 32])
        .call()
        .await
    {
        Ok(_) => Ok(true),
        Err(ContractError::Revert(_))
        | Err(ContractError::DecodingError(_))
        | Err(ContractError::DetokenizationError(_)) => Ok(false),
        Err(e) => Err(X402Error::Blockchain {
            reason: format!("authorizationState() failed for {:?}: {}", token, e),
        }),
    }
}

/// Reads the current `allowance(owner, spender)`.
pub async fn allowance(
    provider: Arc<Provider<Http>>,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256> {
    let contract = Erc20Token::new(token, provider);
    contract
        .allowance(owner, spender)
        .call()
        .await
        .map_err(|e| X402Error::Blockchain {
            reason: format!("allowance() failed for {:?}: {}", token, e),
        })
}
