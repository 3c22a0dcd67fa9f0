//! Network and token registry.
//!
//! Resolves a chain-namespaced network identifier (`eip155:<chainId>`) or its
//! legacy short name to an immutable [`NetworkConfig`]. The registry is built
//! once at process start and handed to the components that need it; there are
//! no module-level mutable singletons. Unknown identifiers are a configuration
//! error surfaced immediately, never silently defaulted.

use crate::errors::{Result, X402Error};

/// Facilitator used when a payer or payee does not configure its own.
pub const DEFAULT_FACILITATOR: &str = "https://facilitator.primer.systems";

/// Immutable per-network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Canonical CAIP-2 identifier, e.g. `eip155:8453`
    pub id: &'static str,

    /// EVM chain id
    pub chain_id: u64,

    /// Display name
    pub name: &'static str,

    /// Default public RPC endpoint
    pub rpc_url: &'static str,

    /// Legacy short name accepted for backwards compatibility
    pub legacy_alias: &'static str,

    /// USDC contract address on this network
    pub usdc: &'static str,
}

const NETWORKS: &[NetworkConfig] = &[
    NetworkConfig {
        id: "eip155:8453",
        chain_id: 8453,
        name: "Base",
        rpc_url: "https://mainnet.base.org",
        legacy_alias: "base",
        usdc: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
    },
    NetworkConfig {
        id: "eip155:84532",
        chain_id: 84532,
        name: "Base Sepolia",
        rpc_url: "https://sepolia.base.org",
        legacy_alias: "base-sepolia",
        usdc: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
    },
    NetworkConfig {
        id: "eip155:137",
        chain_id: 137,
        name: "Polygon",
        rpc_url: "https://polygon-rpc.com",
        legacy_alias: "polygon",
        usdc: "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359",
    },
    NetworkConfig {
        id: "eip155:43114",
        chain_id: 43114,
        name: "Avalanche",
        rpc_url: "https://api.avax.network/ext/bc/C/rpc",
        legacy_alias: "avalanche",
        usdc: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
    },
];

/// Networks the default facilitator settles on.
///
/// A payee route on any other network must name a custom facilitator or its
/// construction fails (fail-fast over silent misrouting).
pub const DEFAULT_FACILITATOR_NETWORKS: &[&str] = &["eip155:8453", "eip155:84532"];

/// Lookup table over the built-in networks.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry;

impl NetworkRegistry {
    /// Creates the registry.
    pub fn new() -> Self {
        Self
    }

    /// Resolves a canonical id or legacy alias to its configuration.
    ///
    /// Every legacy alias maps to exactly one canonical id; resolving either
    /// form returns the identical config.
    pub fn resolve(&self, identifier: &str) -> Result<&'static NetworkConfig> {
        NETWORKS
            .iter()
            .find(|n| n.id == identifier || n.legacy_alias == identifier)
            .ok_or_else(|| X402Error::UnknownNetwork {
                network: identifier.to_string(),
            })
    }

    /// Canonicalizes an identifier, accepting either form.
    pub fn canonicalize(&self, identifier: &str) -> Result<&'static str> {
        self.resolve(identifier).map(|n| n.id)
    }

    /// Whether the default facilitator settles on this network.
    pub fn default_facilitator_supports(&self, identifier: &str) -> bool {
        self.resolve(identifier)
            .map(|n| DEFAULT_FACILITATOR_NETWORKS.contains(&n.id))
            .unwrap_or(false)
    }

    /// All known networks.
    pub fn all(&self) -> &'static [NetworkConfig] {
        NETWORKS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_canonical_and_legacy_identical() {
        let registry = NetworkRegistry::new();
        let by_id = registry.resolve("eip155:8453").unwrap();
        let by_alias = registry.resolve("base").unwrap();
        assert_eq!(by_id, by_alias);
        assert_eq!(by_id.chain_id, 8453);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registry = NetworkRegistry::new();
        let first = registry.resolve("base-sepolia").unwrap();
        let second = registry.resolve("base-sepolia").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.canonicalize("base-sepolia").unwrap(), "eip155:84532");
    }

    #[test]
    fn test_unknown_network_is_an_error() {
        let registry = NetworkRegistry::new();
        let err = registry.resolve("eip155:999999").unwrap_err();
        assert!(matches!(err, X402Error::UnknownNetwork { .. }));
    }

    #[test]
    fn test_aliases_are_injective() {
        let mut aliases: Vec<&str> = NETWORKS.iter().map(|n| n.legacy_alias).collect();
        aliases.sort_unstable();
        aliases.dedup();
        assert_eq!(aliases.len(), NETWORKS.len());
    }

    #[test]
    fn test_default_facilitator_set() {
        let registry = NetworkRegistry::new();
        assert!(registry.default_facilitator_supports("base"));
        assert!(registry.default_facilitator_supports("eip155:84532"));
        assert!(!registry.default_facilitator_supports("polygon"));
        assert!(!registry.default_facilitator_supports("nonsense"));
    }
}
