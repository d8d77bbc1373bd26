//! Application configuration.
//!
//! One TOML file layered with `BROKER__`-prefixed environment variables,
//! e.g. `BROKER__API__PORT=9000` or `BROKER__STORE__URL=redis://...`.

use std::collections::HashSet;

use alloy::primitives::Address;
use broker_api::ApiConfig;
use broker_core::{ChainConfig, ChainId, ChainRegistry, EndpointKind, RpcEndpointSet};
use broker_fee::{FeeConfig, MultiplierSourceConfig, VipReductions};
use broker_hub::HubConfig;
use broker_rpc::LeaseConfig;
use broker_signer::KeySource;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Config file used when neither `--config` nor `BROKER_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/broker.toml";

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "BROKER_CONFIG";

const ENV_PREFIX: &str = "BROKER";
const ENV_SEPARATOR: &str = "__";

/// Coordination store backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-process store. Only valid when both services share one process.
    #[default]
    Memory,
    Redis { url: String },
}

/// Broker key location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyConfig {
    #[serde(flatten)]
    pub source: KeySource,
    /// Refuse to start if the key does not derive this address.
    #[serde(default)]
    pub expected_address: Option<Address>,
}

fn default_approval_lease_secs() -> u64 {
    60
}

/// Payment-token approval behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApprovalConfig {
    /// Send `approve` transactions for tokens not listed in `approved_tokens`.
    #[serde(default)]
    pub on_chain: bool,
    /// RPC lease held while an approval transaction is mined.
    #[serde(default = "default_approval_lease_secs")]
    pub lease_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            on_chain: false,
            lease_secs: default_approval_lease_secs(),
        }
    }
}

/// RPC endpoints of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcConfig {
    pub chain_id: ChainId,
    #[serde(default)]
    pub https: Vec<String>,
    #[serde(default)]
    pub wss: Vec<String>,
}

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Required by `broker-api`; `executor-ws` never signs.
    #[serde(default)]
    pub key: Option<KeyConfig>,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub fee: FeeConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub rpc: Vec<RpcConfig>,
}

impl AppConfig {
    /// Resolve the config path: explicit argument, then `BROKER_CONFIG`,
    /// then [`DEFAULT_CONFIG_PATH`].
    pub fn resolve_path(explicit: Option<String>) -> String {
        explicit
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load `path` with environment overrides, then validate.
    pub fn load(path: &str) -> AppResult<Self> {
        let settings = Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;
        Self::from_settings(settings)
    }

    /// Parse and validate TOML text without environment overrides.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> AppResult<Self> {
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Chain registry built from `[[chains]]`.
    ///
    /// Rejects duplicate chains, zero contract addresses and unsorted
    /// rebate tiers.
    pub fn registry(&self) -> AppResult<ChainRegistry> {
        Ok(ChainRegistry::new(self.chains.clone())?)
    }

    /// Every non-empty `(chain, kind)` endpoint list.
    pub fn endpoint_sets(&self) -> Vec<RpcEndpointSet> {
        self.rpc
            .iter()
            .flat_map(|rpc| {
                [
                    RpcEndpointSet::new(rpc.chain_id, EndpointKind::Https, rpc.https.clone()),
                    RpcEndpointSet::new(rpc.chain_id, EndpointKind::Wss, rpc.wss.clone()),
                ]
            })
            .filter(|set| !set.is_empty())
            .collect()
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.chains.is_empty() {
            return Err(AppError::Config(
                "at least one [[chains]] entry is required".into(),
            ));
        }
        let registry = self.registry()?;

        let mut with_https = HashSet::new();
        for rpc in &self.rpc {
            if !registry.contains(rpc.chain_id) {
                return Err(AppError::Config(format!(
                    "[[rpc]] entry for unknown chain {}",
                    rpc.chain_id
                )));
            }
            if rpc.https.iter().chain(&rpc.wss).any(|u| u.trim().is_empty()) {
                return Err(AppError::Config(format!(
                    "empty RPC URL for chain {}",
                    rpc.chain_id
                )));
            }
            if !rpc.https.is_empty() {
                with_https.insert(rpc.chain_id);
            }
        }
        for chain_id in registry.chain_ids() {
            if !with_https.contains(&chain_id) {
                return Err(AppError::Config(format!(
                    "chain {chain_id} has no HTTPS RPC endpoint"
                )));
            }
        }

        if self.lease.lease_secs == 0 || self.approval.lease_secs == 0 {
            return Err(AppError::Config(
                "lease.lease_secs and approval.lease_secs must be positive".into(),
            ));
        }

        if self.fee.soft_ttl_secs >= self.fee.hard_ttl_secs {
            return Err(AppError::Config(format!(
                "fee soft_ttl_secs ({}) must be below hard_ttl_secs ({})",
                self.fee.soft_ttl_secs, self.fee.hard_ttl_secs
            )));
        }
        if let MultiplierSourceConfig::Vip { reductions, .. } = &self.fee.source {
            VipReductions::parse(reductions)?;
        }
        if self.hub.pong_wait_secs == 0 || self.hub.max_message_bytes == 0 {
            return Err(AppError::Config(
                "hub pong_wait_secs and max_message_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_rpc::{ExhaustionPolicy, SelectionPolicy};
    use rust_decimal_macros::dec;

    const MINIMAL: &str = r#"
        [[chains]]
        chain_id = 1101
        name = "zkevm"
        multipay_contract = "0x30b55550e02B663E15A95B50850ebD20363c2AD5"
        proxy_contract = "0xa0b8b6b6e3a33e2b1c64a4b5e7fe1a1d3e9c1f20"

        [[rpc]]
        chain_id = 1101
        https = ["https://zkevm-rpc.com"]
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.api.base_fee_tbps, 60);
        assert_eq!(config.hub.port, 8080);
        assert_eq!(config.hub.pong_wait_secs, 60);
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(config.key.is_none());
        assert!(!config.approval.on_chain);
        assert_eq!(config.lease.lease_secs, 10);
        assert_eq!(config.lease.selection, SelectionPolicy::RoundRobin);
        assert_eq!(config.lease.exhaustion, ExhaustionPolicy::FailFast);
        assert_eq!(config.fee.soft_ttl_secs, 3_600);
        assert_eq!(config.fee.hard_ttl_secs, 86_400);
        assert_eq!(config.fee.source, MultiplierSourceConfig::Tokens);
        assert_eq!(config.endpoint_sets().len(), 1);
    }

    #[test]
    fn test_full_config() {
        let toml = format!(
            r#"
            [store]
            backend = "redis"
            url = "redis://localhost:6379/"

            [key]
            source = "env_var"
            var_name = "BROKER_KEY"
            expected_address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"

            [lease]
            lease_secs = 15
            selection = "first_available"

            [lease.exhaustion]
            mode = "block"
            max_wait_ms = 2000
            poll_interval_ms = 100

            [fee.source]
            kind = "vip"
            reductions = "1101:50,75,90"

            {MINIMAL}

            [[chains.rebate_tokens]]
            name = "D8X"
            address = "0x2d10075E54356E16Ebd5C6BB5194290709B69C1e"
            decimals = 18
            scheme = [
                {{ amount = "100", multiplier = "0.9" }},
                {{ amount = "1000", multiplier = "0.5" }},
            ]
            "#
        );
        let config = AppConfig::from_toml_str(&toml).unwrap();

        assert_eq!(
            config.store,
            StoreConfig::Redis {
                url: "redis://localhost:6379/".into()
            }
        );
        let key = config.key.unwrap();
        assert_eq!(
            key.source,
            KeySource::EnvVar {
                var_name: "BROKER_KEY".into()
            }
        );
        assert!(key.expected_address.is_some());
        assert_eq!(config.lease.lease_secs, 15);
        assert_eq!(config.lease.selection, SelectionPolicy::FirstAvailable);
        assert_eq!(
            config.lease.exhaustion,
            ExhaustionPolicy::Block {
                max_wait_ms: 2000,
                poll_interval_ms: 100
            }
        );
        assert!(matches!(config.fee.source, MultiplierSourceConfig::Vip { .. }));
        let scheme = &config.chains[0].rebate_tokens[0].scheme;
        assert_eq!(scheme[1].amount, dec!(1000));
        assert_eq!(scheme[1].multiplier, dec!(0.5));
    }

    #[test]
    fn test_requires_a_chain() {
        let err = AppConfig::from_toml_str("").unwrap_err();
        assert!(err.to_string().contains("at least one [[chains]]"));
    }

    #[test]
    fn test_chain_without_https_endpoint() {
        let toml = MINIMAL.replace(r#"https = ["https://zkevm-rpc.com"]"#, r#"wss = ["wss://x"]"#);
        let err = AppConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("no HTTPS RPC endpoint"));
    }

    #[test]
    fn test_rpc_for_unknown_chain() {
        let toml = format!("{MINIMAL}\n[[rpc]]\nchain_id = 196\nhttps = [\"https://x\"]\n");
        let err = AppConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown chain 196"));
    }

    #[test]
    fn test_zero_contract_rejected() {
        let toml = MINIMAL.replace(
            "0x30b55550e02B663E15A95B50850ebD20363c2AD5",
            "0x0000000000000000000000000000000000000000",
        );
        let err = AppConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("zero multipay_contract"));
    }

    #[test]
    fn test_unsorted_tiers_rejected() {
        let toml = format!(
            r#"{MINIMAL}
            [[chains.rebate_tokens]]
            name = "D8X"
            address = "0x2d10075E54356E16Ebd5C6BB5194290709B69C1e"
            decimals = 18
            scheme = [
                {{ amount = "1000", multiplier = "0.5" }},
                {{ amount = "100", multiplier = "0.9" }},
            ]
            "#
        );
        let err = AppConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("sorted"));
    }

    #[test]
    fn test_bad_vip_reductions_rejected() {
        let toml = format!("[fee.source]\nkind = \"vip\"\nreductions = \"1101:150\"\n{MINIMAL}");
        assert!(AppConfig::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_inverted_fee_ttls_rejected() {
        let toml = format!("[fee]\nsoft_ttl_secs = 90000\n{MINIMAL}");
        let err = AppConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("soft_ttl_secs"));
    }

    #[test]
    fn test_zero_lease_lifetimes_rejected() {
        for section in ["[lease]", "[approval]"] {
            let toml = format!("{section}\nlease_secs = 0\n{MINIMAL}");
            let err = AppConfig::from_toml_str(&toml).unwrap_err();
            assert!(err.to_string().contains("lease_secs"), "{section}: {err}");
        }
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        assert_eq!(
            AppConfig::resolve_path(Some("custom.toml".into())),
            "custom.toml"
        );
    }

    #[test]
    fn test_shipped_config_loads_with_env_override() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/broker.toml");
        std::env::set_var("BROKER__API__BASE_FEE_TBPS", "42");
        let config = AppConfig::load(path).unwrap();
        std::env::remove_var("BROKER__API__BASE_FEE_TBPS");

        assert_eq!(config.api.base_fee_tbps, 42);
        assert!(!config.chains.is_empty());
        assert!(config.key.is_some());
    }
}
