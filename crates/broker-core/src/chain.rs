//! Chain registry and RPC endpoint sets.
//!
//! The registry is loaded once at startup and shared read-only by every
//! component. Lookups are plain `HashMap` reads and need no synchronisation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fee::RebateToken;

/// Numeric EVM chain id.
pub type ChainId = u64;

/// Static configuration for one supported chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub name: String,
    /// Payments contract whose address scopes executor payment signatures.
    pub multipay_contract: Address,
    /// Perpetual proxy contract that scopes broker order signatures.
    pub proxy_contract: Address,
    #[serde(default)]
    pub allowed_executors: Vec<Address>,
    #[serde(default)]
    pub rebate_tokens: Vec<RebateToken>,
    /// Payment tokens already approved for spending by the multipay contract.
    #[serde(default)]
    pub approved_tokens: Vec<Address>,
}

impl ChainConfig {
    /// Whether `executor` is on this chain's allow-list.
    pub fn is_allowed_executor(&self, executor: &Address) -> bool {
        self.allowed_executors.iter().any(|a| a == executor)
    }

    /// Case-insensitive comparison against the registered multipay contract.
    ///
    /// `Address` equality is byte equality, so checksum casing never matters.
    pub fn matches_multipay(&self, contract: &Address) -> bool {
        self.multipay_contract == *contract
    }

    fn validate(&self) -> CoreResult<()> {
        if self.chain_id == 0 {
            return Err(CoreError::InvalidConfig("chain_id must be non-zero".into()));
        }
        if self.multipay_contract.is_zero() {
            return Err(CoreError::InvalidConfig(format!(
                "chain {} has a zero multipay_contract",
                self.chain_id
            )));
        }
        if self.proxy_contract.is_zero() {
            return Err(CoreError::InvalidConfig(format!(
                "chain {} has a zero proxy_contract",
                self.chain_id
            )));
        }
        for token in &self.rebate_tokens {
            token.validate().map_err(|e| {
                CoreError::InvalidConfig(format!("chain {}: {}", self.chain_id, e))
            })?;
        }
        Ok(())
    }
}

/// Immutable map of chain id to chain configuration.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<ChainId, ChainConfig>,
}

impl ChainRegistry {
    /// Build a registry, rejecting duplicate or invalid chain entries.
    pub fn new(configs: Vec<ChainConfig>) -> CoreResult<Self> {
        let mut chains = HashMap::with_capacity(configs.len());
        for config in configs {
            config.validate()?;
            let chain_id = config.chain_id;
            if chains.insert(chain_id, config).is_some() {
                return Err(CoreError::DuplicateChain(chain_id));
            }
        }
        Ok(Self { chains })
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.get(&chain_id)
    }

    /// Like [`get`](Self::get) but fails with `UnknownChain`.
    pub fn require(&self, chain_id: ChainId) -> CoreResult<&ChainConfig> {
        self.get(chain_id).ok_or(CoreError::UnknownChain(chain_id))
    }

    pub fn contains(&self, chain_id: ChainId) -> bool {
        self.chains.contains_key(&chain_id)
    }

    /// Chain ids in ascending order.
    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<_> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Chain configurations ordered by chain id.
    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        let mut configs: Vec<_> = self.chains.values().collect();
        configs.sort_by_key(|c| c.chain_id);
        configs.into_iter()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// RPC endpoint protocol. The dial path differs per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Https,
    Wss,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Https => "https",
            Self::Wss => "wss",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "https" | "http" => Ok(Self::Https),
            "wss" | "ws" => Ok(Self::Wss),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown endpoint kind: {other}"
            ))),
        }
    }
}

/// Ordered endpoint URLs for one (chain, kind) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpointSet {
    pub chain_id: ChainId,
    pub kind: EndpointKind,
    pub urls: Vec<String>,
}

impl RpcEndpointSet {
    pub fn new(chain_id: ChainId, kind: EndpointKind, urls: Vec<String>) -> Self {
        Self {
            chain_id,
            kind,
            urls,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::address;

    pub(crate) fn sample_chain(chain_id: ChainId) -> ChainConfig {
        ChainConfig {
            chain_id,
            name: format!("chain-{chain_id}"),
            multipay_contract: address!("30b55550e02B663E15A95B50850ebD20363c2AD5"),
            proxy_contract: address!("a0b8b6b6e3a33e2b1c64a4b5e7fe1a1d3e9c1f20"),
            allowed_executors: vec![address!("Da47a0CAc77D50114F2725D06a2Ce887cF9f4D98")],
            rebate_tokens: vec![],
            approved_tokens: vec![],
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ChainRegistry::new(vec![sample_chain(1101), sample_chain(196)]).unwrap();
        assert!(registry.contains(1101));
        assert!(!registry.contains(9999));
        assert_eq!(registry.chain_ids(), vec![196, 1101]);
        assert!(matches!(
            registry.require(9999),
            Err(CoreError::UnknownChain(9999))
        ));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = ChainRegistry::new(vec![sample_chain(1101), sample_chain(1101)]);
        assert!(matches!(result, Err(CoreError::DuplicateChain(1101))));
    }

    #[test]
    fn test_registry_rejects_zero_contract() {
        let mut chain = sample_chain(1101);
        chain.multipay_contract = Address::ZERO;
        assert!(ChainRegistry::new(vec![chain]).is_err());
    }

    #[test]
    fn test_executor_allow_list() {
        let chain = sample_chain(1101);
        assert!(chain.is_allowed_executor(&address!("Da47a0CAc77D50114F2725D06a2Ce887cF9f4D98")));
        assert!(!chain.is_allowed_executor(&Address::ZERO));
    }

    #[test]
    fn test_endpoint_kind_parse() {
        assert_eq!("HTTPS".parse::<EndpointKind>().unwrap(), EndpointKind::Https);
        assert_eq!("wss".parse::<EndpointKind>().unwrap(), EndpointKind::Wss);
        assert!("grpc".parse::<EndpointKind>().is_err());
        assert_eq!(EndpointKind::Wss.to_string(), "wss");
    }
}
