//! Provider Configuration
//!
//! Configuration management for the Spotnet provider daemon.
//! Supports environment variables, config files, and CLI arguments.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use spotnet_agent::{AgentConfig, Capabilities};
use spotnet_crypto::AgentSigner;
use spotnet_types::wire::parse_address;
use spotnet_types::Address;

/// Provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Pubsub transport
    #[serde(default)]
    pub bus: BusSettings,

    /// Chain node and contracts
    #[serde(default)]
    pub chain: ChainSettings,

    /// Provider key material
    #[serde(default)]
    pub identity: IdentitySettings,

    /// What the agent serves and how
    #[serde(default)]
    pub negotiation: NegotiationSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pubsub settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// IPFS daemon HTTP API
    #[serde(default = "default_ipfs_api_url")]
    pub ipfs_api_url: String,

    /// Topic demands arrive on and offers are published to
    #[serde(default = "default_provider_topic", alias = "provider_ipfs_topic")]
    pub provider_topic: String,

    /// Topic liabilities and results arrive on
    #[serde(default = "default_spot_topic", alias = "spot_ipfs_topic")]
    pub spot_topic: String,

    /// Peer ids to accept messages from (empty = any)
    #[serde(default)]
    pub trusted_peers: Vec<String>,

    /// First wait before resubscribing to a dropped topic, in milliseconds
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Longest wait between resubscribe attempts, in milliseconds
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            ipfs_api_url: default_ipfs_api_url(),
            provider_topic: default_provider_topic(),
            spot_topic: default_spot_topic(),
            trusted_peers: Vec::new(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl BusSettings {
    /// (first, longest) wait between resubscribe attempts
    pub fn reconnect_backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }
}

/// Chain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    /// JSON-RPC endpoint
    #[serde(default = "default_http_node_provider")]
    pub http_node_provider: String,

    /// Factory contract holding offer nonces
    #[serde(default = "default_factory_address")]
    pub factory_contract_address: String,

    /// Upper bound on each chain read, in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            http_node_provider: default_http_node_provider(),
            factory_contract_address: default_factory_address(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl ChainSettings {
    pub fn factory(&self) -> anyhow::Result<Address> {
        parse_address(&self.factory_contract_address)
            .map_err(|e| anyhow::anyhow!("chain.factory_contract_address: {}", e))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Identity settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentitySettings {
    /// Hex-encoded secp256k1 private key
    #[serde(default, alias = "spot_pk")]
    pub private_key: String,

    /// Expected provider address; checked against the key when set
    #[serde(default, alias = "spot_address")]
    pub address: Option<String>,
}

impl IdentitySettings {
    /// Load the signer, checking it against the configured address
    pub fn signer(&self) -> anyhow::Result<AgentSigner> {
        if self.private_key.trim().is_empty() {
            anyhow::bail!("identity.private_key is not set");
        }
        let signer = AgentSigner::from_hex(&self.private_key)
            .map_err(|e| anyhow::anyhow!("identity.private_key: {}", e))?;

        if let Some(expected) = &self.address {
            let expected = parse_address(expected)
                .map_err(|e| anyhow::anyhow!("identity.address: {}", e))?;
            if expected != signer.address() {
                anyhow::bail!(
                    "identity.address {} does not match the private key (derives {})",
                    expected,
                    signer.address()
                );
            }
        }
        Ok(signer)
    }
}

/// Negotiation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSettings {
    /// Model identifier this provider serves
    #[serde(default)]
    pub model: String,

    /// Requester addresses to serve (empty = any)
    #[serde(default)]
    pub allowed_requesters: Vec<String>,

    /// Queue demands that arrive while busy
    #[serde(default = "default_true")]
    pub supports_queueing: bool,

    /// Answer liability assignments with their objective
    #[serde(default = "default_true")]
    pub supports_liability_resolution: bool,

    /// Negotiation trace capacity
    #[serde(default = "default_trace_max_entries")]
    pub trace_max_entries: usize,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            allowed_requesters: Vec::new(),
            supports_queueing: true,
            supports_liability_resolution: true,
            trace_max_entries: default_trace_max_entries(),
        }
    }
}

impl NegotiationSettings {
    pub fn allowed_requesters(&self) -> anyhow::Result<Vec<Address>> {
        self.allowed_requesters
            .iter()
            .map(|text| {
                parse_address(text)
                    .map_err(|e| anyhow::anyhow!("negotiation.allowed_requesters: {}", e))
            })
            .collect()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_ipfs_api_url() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_provider_topic() -> String {
    "spotnet.provider".to_string()
}

fn default_spot_topic() -> String {
    "spotnet.spot".to_string()
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_http_node_provider() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_factory_address() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

fn default_call_timeout() -> u64 {
    30
}

fn default_trace_max_entries() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl ProviderConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        // SPOTNET__CHAIN__HTTP_NODE_PROVIDER=... and friends
        builder = builder.add_source(
            config::Environment::with_prefix("SPOTNET")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("bus.trusted_peers")
                .with_list_parse_key("negotiation.allowed_requesters"),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Local development against a hardhat node and a local IPFS daemon
    pub fn development() -> Self {
        Self {
            identity: IdentitySettings {
                // hardhat account #0
                private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                    .to_string(),
                address: Some("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string()),
            },
            negotiation: NegotiationSettings {
                model: "QmDevModel".to_string(),
                ..Default::default()
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
            ..Default::default()
        }
    }

    /// Reject configurations the agent cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bus.provider_topic.trim().is_empty() || self.bus.spot_topic.trim().is_empty() {
            anyhow::bail!("bus.provider_topic and bus.spot_topic must both be set");
        }
        if self.bus.provider_topic == self.bus.spot_topic {
            anyhow::bail!(
                "bus.provider_topic and bus.spot_topic must differ (both are '{}')",
                self.bus.provider_topic
            );
        }
        if self.bus.reconnect_initial_ms == 0
            || self.bus.reconnect_max_ms < self.bus.reconnect_initial_ms
        {
            anyhow::bail!("bus.reconnect_initial_ms must be positive and at most bus.reconnect_max_ms");
        }
        if self.negotiation.model.trim().is_empty() {
            anyhow::bail!("negotiation.model must be set");
        }
        if self.chain.call_timeout_secs == 0 {
            anyhow::bail!("chain.call_timeout_secs must be positive");
        }
        self.chain.factory()?;
        self.negotiation.allowed_requesters()?;
        self.identity.signer()?;
        Ok(())
    }

    /// Agent settings derived from this configuration
    pub fn agent_config(&self) -> anyhow::Result<AgentConfig> {
        let mut agent = AgentConfig::new(
            self.bus.provider_topic.clone(),
            self.bus.spot_topic.clone(),
            self.negotiation.model.clone(),
        );
        agent.capabilities = Capabilities {
            queueing: self.negotiation.supports_queueing,
            liability_resolution: self.negotiation.supports_liability_resolution,
        };
        agent.allowed_requesters = self.negotiation.allowed_requesters()?;
        agent.trusted_peers = self.bus.trusted_peers.clone();
        agent.call_timeout = self.chain.call_timeout();
        agent.trace_max_entries = Some(self.negotiation.trace_max_entries);
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.bus.ipfs_api_url, "http://127.0.0.1:5001");
        assert_eq!(config.chain.call_timeout(), Duration::from_secs(30));
        assert!(config.negotiation.supports_queueing);
        assert!(config.negotiation.supports_liability_resolution);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(
            config.bus.reconnect_backoff(),
            (Duration::from_millis(500), Duration::from_secs(30))
        );
        // No key and no model
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_development_is_valid() {
        let config = ProviderConfig::development();
        config.validate().unwrap();

        let agent = config.agent_config().unwrap();
        assert_eq!(agent.provider_topic, "spotnet.provider");
        assert_eq!(agent.model, "QmDevModel");
        assert_eq!(agent.call_timeout, Duration::from_secs(30));
        assert_eq!(agent.trace_max_entries, Some(1024));
        assert!(agent.allowed_requesters.is_empty());
    }

    #[test]
    fn test_validation_failures() {
        let mut no_backoff = ProviderConfig::development();
        no_backoff.bus.reconnect_initial_ms = 0;
        assert!(no_backoff.validate().is_err());

        let mut inverted_backoff = ProviderConfig::development();
        inverted_backoff.bus.reconnect_max_ms = inverted_backoff.bus.reconnect_initial_ms - 1;
        assert!(inverted_backoff.validate().is_err());

        let mut same_topics = ProviderConfig::development();
        same_topics.bus.spot_topic = same_topics.bus.provider_topic.clone();
        assert!(same_topics.validate().is_err());

        let mut empty_topic = ProviderConfig::development();
        empty_topic.bus.provider_topic = " ".to_string();
        assert!(empty_topic.validate().is_err());

        let mut no_model = ProviderConfig::development();
        no_model.negotiation.model.clear();
        assert!(no_model.validate().is_err());

        let mut wrong_address = ProviderConfig::development();
        wrong_address.identity.address =
            Some("0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string());
        let err = wrong_address.validate().unwrap_err();
        assert!(err.to_string().contains("does not match"));

        let mut bad_key = ProviderConfig::development();
        bad_key.identity.private_key = "0x1234".to_string();
        assert!(bad_key.validate().is_err());

        let mut bad_requester = ProviderConfig::development();
        bad_requester.negotiation.allowed_requesters = vec!["0xT".to_string()];
        assert!(bad_requester.validate().is_err());
    }

    #[test]
    fn test_legacy_key_names() {
        let json = r#"{
            "bus": {"provider_ipfs_topic": "provider", "spot_ipfs_topic": "spot"},
            "identity": {
                "spot_pk": "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
                "spot_address": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
            },
            "negotiation": {"model": "QmModel", "allowed_requesters": ["0x00000000000000000000000000000000000000a1"]}
        }"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bus.provider_topic, "provider");
        assert_eq!(config.negotiation.allowed_requesters().unwrap().len(), 1);
        assert!(config.identity.signer().is_ok());
    }
}
