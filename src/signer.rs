//! Signer abstraction over two backends.
//!
//! A [`PaymentSigner`] exposes exactly the capability set the payer flow
//! needs: an address, a canonical network, a read-capable chain handle, and
//! digest signing. The key-backed variant signs locally; the external variant
//! delegates to a caller-supplied [`WalletHandle`] (hardware or remote
//! signer), which may suspend for as long as it likes; this layer imposes no
//! timeout of its own, the caller owns that risk. Backend-specific state never
//! leaks into the common surface.

use crate::errors::{Result, X402Error};
use crate::network::{NetworkConfig, NetworkRegistry};
use async_trait::async_trait;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256, U256};
use std::sync::Arc;

/// A caller-supplied signing backend, e.g. a hardware or remote wallet.
#[async_trait]
pub trait WalletHandle: Send + Sync {
    /// The wallet's address.
    fn address(&self) -> Address;

    /// Signs a 32-byte payment digest. May await external confirmation
    /// indefinitely.
    async fn sign_digest(&self, digest: H256) -> Result<Signature>;
}

/// Signing capability for the payer flow, tagged by backend.
#[derive(Clone)]
pub enum PaymentSigner {
    /// Holds a private key; signing is local computation.
    Key {
        /// The signing wallet
        wallet: LocalWallet,
        /// Chain read handle
        provider: Arc<Provider<Http>>,
        /// Resolved network configuration
        network: &'static NetworkConfig,
    },
    /// Delegates signing to an external wallet handle.
    External {
        /// The delegated signing backend
        handle: Arc<dyn WalletHandle>,
        /// Chain read handle
        provider: Arc<Provider<Http>>,
        /// Resolved network configuration
        network: &'static NetworkConfig,
    },
}

impl PaymentSigner {
    /// Creates a key-backed signer on the given network (canonical id or
    /// legacy alias), connecting to the network's default RPC endpoint.
    pub fn from_private_key(private_key: &str, network: &str) -> Result<Self> {
        let config = NetworkRegistry::new().resolve(network)?;
        Self::from_private_key_with_rpc(private_key, network, config.rpc_url)
    }

    /// Creates a key-backed signer with an explicit RPC endpoint.
    pub fn from_private_key_with_rpc(
        private_key: &str,
        network: &str,
        rpc_url: &str,
    ) -> Result<Self> {
        let config = NetworkRegistry::new().resolve(network)?;
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| X402Error::Config {
                reason: format!("invalid private key: {}", e),
            })?
            .with_chain_id(config.chain_id);
        let provider = Provider::<Http>::try_from(rpc_url)?;
        Ok(PaymentSigner::Key {
            wallet,
            provider: Arc::new(provider),
            network: config,
        })
    }

    /// Creates a signer backed by an external wallet handle.
    pub fn from_wallet_handle(handle: Arc<dyn WalletHandle>, network: &str) -> Result<Self> {
        let config = NetworkRegistry::new().resolve(network)?;
        let provider = Provider::<Http>::try_from(config.rpc_url)?;
        Ok(PaymentSigner::External {
            handle,
            provider: Arc::new(provider),
            network: config,
        })
    }

    /// The payer address.
    pub fn address(&self) -> Address {
        match self {
            PaymentSigner::Key { wallet, .. } => wallet.address(),
            PaymentSigner::External { handle, .. } => handle.address(),
        }
    }

    /// The resolved network configuration.
    pub fn network(&self) -> &'static NetworkConfig {
        match self {
            PaymentSigner::Key { network, .. } => network,
            PaymentSigner::External { network, .. } => network,
        }
    }

    /// The chain id as a uint256.
    pub fn chain_id(&self) -> U256 {
        U256::from(self.network().chain_id)
    }

    /// A read-capable chain handle.
    pub fn provider(&self) -> Arc<Provider<Http>> {
        match self {
            PaymentSigner::Key { provider, .. } => Arc::clone(provider),
            PaymentSigner::External { provider, .. } => Arc::clone(provider),
        }
    }

    /// Signs a payment digest with whichever backend is configured.
    pub async fn sign_digest(&self, digest: H256) -> Result<Signature> {
        match self {
            PaymentSigner::Key { wallet, .. } => {
                wallet.sign_hash(digest).map_err(|e| X402Error::Signature {
                    reason: e.to_string(),
                })
            }
            PaymentSigner::External { handle, .. } => handle.sign_digest(digest).await,
        }
    }
}

impl std::fmt::Debug for PaymentSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentSigner::Key { network, .. } => f
                .debug_struct("PaymentSigner::Key")
                .field("address", &self.address())
                .field("network", &network.id)
                .finish_non_exhaustive(),
            PaymentSigner::External { network, .. } => f
                .debug_struct("PaymentSigner::External")
                .field("address", &self.address())
                .field("network", &network.id)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_key_signer_construction() {
        let signer = PaymentSigner::from_private_key(TEST_KEY, "base").unwrap();
        assert_eq!(signer.network().id, "eip155:8453");
        assert_eq!(signer.chain_id(), U256::from(8453u64));
        assert_ne!(signer.address(), Address::zero());
    }

    #[test]
    fn test_invalid_key_is_config_error() {
        let err = PaymentSigner::from_private_key("0xzz", "base").unwrap_err();
        assert!(matches!(err, X402Error::Config { .. }));
    }

    #[test]
    fn test_unknown_network_rejected_at_construction() {
        let err = PaymentSigner::from_private_key(TEST_KEY, "eip155:1234").unwrap_err();
        assert!(matches!(err, X402Error::UnknownNetwork { .. }));
    }

    #[tokio::test]
    async fn test_key_signing_matches_external_handle() {
        struct KeyHandle(LocalWallet);

        #[async_trait]
        impl WalletHandle for KeyHandle {
            fn address(&self) -> Address {
                self.0.address()
            }

            async fn sign_digest(&self, digest: H256) -> Result<Signature> {
                self.0.sign_hash(digest).map_err(|e| X402Error::Signature {
                    reason: e.to_string(),
                })
            }
        }

        let wallet: LocalWallet = TEST_KEY.parse().unwrap();
        let keyed = PaymentSigner::from_private_key(TEST_KEY, "base").unwrap();
        let external =
            PaymentSigner::from_wallet_handle(Arc::new(KeyHandle(wallet)), "base").unwrap();

        assert_eq!(keyed.address(), external.address());

        let digest = H256::from_low_u64_be(42);
        let a = keyed.sign_digest(digest).await.unwrap();
        let b = external.sign_digest(digest).await.unwrap();
        assert_eq!(a.r, b.r);
        assert_eq!(a.s, b.s);
    }
}
