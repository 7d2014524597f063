//! Faucet configuration

use anyhow::Context;
use drip_common::utils::logging::LoggingConfig;
use drip_common::{Address, ChainId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{FaucetError, FaucetResult};

/// Testnets the faucet knows how to configure from the environment:
/// `(chain id, display name, env prefix)`
pub const KNOWN_NETWORKS: [(ChainId, &str, &str); 3] = [
    (11155111, "Sepolia", "SEPOLIA"),
    (421614, "Arbitrum Sepolia", "ARBITRUM_SEPOLIA"),
    (11155420, "OP Sepolia", "OPTIMISM_SEPOLIA"),
];

fn parse_var<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", name, value))
}

/// Raw per-network settings, possibly incomplete
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: ChainId,
    pub name: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub faucet_address: Option<String>,
}

/// Faucet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Server address
    pub server_addr: String,

    /// Relayer private key (hex). Required at startup.
    #[serde(skip_serializing)]
    pub relayer_private_key: Option<String>,

    /// Redis URL; when unset all state is kept in process memory
    pub redis_url: Option<String>,

    /// Cooldown between successful claims of one user on one network (seconds)
    pub cooldown_secs: u64,

    /// Admission window length (seconds)
    pub window_secs: u64,

    /// Claims admitted per network per window
    pub window_capacity: u32,

    /// Timeout applied separately to gas estimation and broadcast (seconds)
    pub chain_timeout_secs: u64,

    /// Extra gas on top of the estimate, in percent
    pub gas_headroom_percent: u64,

    /// Enable CORS
    pub cors_enabled: bool,

    pub logging: LoggingConfig,

    pub networks: Vec<NetworkConfig>,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:8081".to_string(),
            relayer_private_key: None,
            redis_url: None,
            cooldown_secs: 86400,  // 24 hours
            window_secs: 3600,     // 1 hour
            window_capacity: 20,
            chain_timeout_secs: 30,
            gas_headroom_percent: 20,
            cors_enabled: true,
            logging: LoggingConfig::default(),
            networks: KNOWN_NETWORKS
                .iter()
                .map(|(chain_id, name, _)| NetworkConfig {
                    chain_id: *chain_id,
                    name: name.to_string(),
                    rpc_url: None,
                    faucet_address: None,
                })
                .collect(),
        }
    }
}

impl FaucetConfig {
    /// Defaults (or the given file) with environment variables layered on top
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env()
    }

    /// TOML, YAML or JSON depending on the file extension
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let path_str = path.to_str().context("Invalid config path")?;

        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path_str))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        info!("Loaded configuration from {}", path_str);
        Ok(config)
    }

    /// Load from environment variables with defaults
    pub fn from_env() -> anyhow::Result<Self> {
        Self::default().with_env()
    }

    fn with_env(self) -> anyhow::Result<Self> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Layer variables from `var` over `self`. A variable that is set but
    /// does not parse aborts loading.
    fn apply_env(mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        if let Some(addr) = var("FAUCET_SERVER_ADDR") {
            self.server_addr = addr;
        }

        if let Some(key) = var("RELAYER_PRIVATE_KEY") {
            self.relayer_private_key = Some(key);
        }

        if let Some(url) = var("REDIS_URL") {
            self.redis_url = Some(url);
        }

        if let Some(cooldown) = var("FAUCET_COOLDOWN_SECS") {
            self.cooldown_secs = parse_var("FAUCET_COOLDOWN_SECS", &cooldown)?;
        }

        if let Some(window) = var("FAUCET_WINDOW_SECS") {
            self.window_secs = parse_var("FAUCET_WINDOW_SECS", &window)?;
        }

        if let Some(capacity) = var("FAUCET_WINDOW_CAPACITY") {
            self.window_capacity = parse_var("FAUCET_WINDOW_CAPACITY", &capacity)?;
        }

        if let Some(timeout) = var("FAUCET_CHAIN_TIMEOUT_SECS") {
            self.chain_timeout_secs = parse_var("FAUCET_CHAIN_TIMEOUT_SECS", &timeout)?;
        }

        if let Some(headroom) = var("FAUCET_GAS_HEADROOM_PERCENT") {
            self.gas_headroom_percent = parse_var("FAUCET_GAS_HEADROOM_PERCENT", &headroom)?;
        }

        if let Some(enabled) = var("FAUCET_CORS_ENABLED") {
            self.cors_enabled = parse_var("FAUCET_CORS_ENABLED", &enabled.to_lowercase())?;
        }

        if let Some(format) = var("FAUCET_LOG_FORMAT") {
            self.logging.format = format;
        }

        for (chain_id, name, prefix) in KNOWN_NETWORKS {
            let rpc_url = var(&format!("{}_RPC_URL", prefix));
            let faucet_address = var(&format!("{}_FAUCET_ADDRESS", prefix));
            if rpc_url.is_none() && faucet_address.is_none() {
                continue;
            }

            let index = match self.networks.iter().position(|n| n.chain_id == chain_id) {
                Some(index) => index,
                None => {
                    self.networks.push(NetworkConfig {
                        chain_id,
                        name: name.to_string(),
                        rpc_url: None,
                        faucet_address: None,
                    });
                    self.networks.len() - 1
                }
            };
            let network = &mut self.networks[index];
            if rpc_url.is_some() {
                network.rpc_url = rpc_url;
            }
            if faucet_address.is_some() {
                network.faucet_address = faucet_address;
            }
        }

        Ok(self)
    }

    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn chain_timeout(&self) -> Duration {
        Duration::from_secs(self.chain_timeout_secs)
    }
}

/// A fully configured network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc_url: String,
    pub faucet_address: Address,
}

/// The fixed set of networks this process serves
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: BTreeMap<ChainId, Network>,
}

impl NetworkRegistry {
    /// Networks missing an RPC URL or faucet address are left out.
    /// A malformed faucet address is an error, as is ending up with nothing.
    pub fn from_config(configs: &[NetworkConfig]) -> FaucetResult<Self> {
        let mut networks = BTreeMap::new();

        for config in configs {
            let (rpc_url, faucet) = match (&config.rpc_url, &config.faucet_address) {
                (Some(rpc), Some(faucet)) if !rpc.is_empty() && !faucet.is_empty() => (rpc, faucet),
                _ => {
                    warn!(
                        "Skipping {} (chainId: {}): RPC URL or faucet address not set",
                        config.name, config.chain_id
                    );
                    continue;
                }
            };

            let faucet_address: Address = faucet.trim().parse().map_err(|e| {
                FaucetError::Config(format!(
                    "Invalid faucet address for {}: {}",
                    config.name, e
                ))
            })?;

            info!("Configured: {} (chainId: {})", config.name, config.chain_id);
            networks.insert(
                config.chain_id,
                Network {
                    chain_id: config.chain_id,
                    name: config.name.clone(),
                    rpc_url: rpc_url.clone(),
                    faucet_address,
                },
            );
        }

        if networks.is_empty() {
            return Err(FaucetError::Config(
                "No networks configured. Set the RPC URL and faucet address for at least one network."
                    .to_string(),
            ));
        }

        Ok(Self { networks })
    }

    pub fn from_networks(networks: impl IntoIterator<Item = Network>) -> Self {
        Self {
            networks: networks.into_iter().map(|n| (n.chain_id, n)).collect(),
        }
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&Network> {
        self.networks.get(&chain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.networks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
