//! Configuration for the recovery-wallet coordination client.
//!
//! This module provides configuration for connecting to the chain RPC
//! endpoint of different networks, the registry contract coordinating
//! recovery wallets, and the client-side cache/retry/polling knobs.

use crate::error::{RecoveryError, Result};
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Public test network
    Testnet,
    /// Production network
    Mainnet,
    /// Custom network with user-defined endpoints
    Custom,
}

impl Network {
    /// Get the default chain RPC URL for this network
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Testnet => "https://rpc-testnet.rollbackwallet.io",
            Network::Mainnet => "https://rpc.rollbackwallet.io",
            Network::Custom => "",
        }
    }

    /// Get the default recovery-registry contract address for this network
    pub fn default_registry_contract(&self) -> &'static str {
        match self {
            Network::Testnet => "0x5c3f1a9e7b2d8c4f6a0e1b3d5c7f9a2b4d6e8c01",
            Network::Mainnet => "0x9d2b4c6e8f0a1b3c5d7e9f0a2c4e6b8d0f1a3c52",
            Network::Custom => "",
        }
    }
}

/// Configuration for the recovery client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Network to connect to
    pub network: Network,

    /// Chain RPC endpoint URL
    pub rpc_url: String,

    /// Recovery-registry contract address
    pub registry_contract: Address,

    /// Optional persistence-mirror endpoint (best-effort upserts)
    pub mirror_url: Option<String>,

    /// Optional path for the durable wallet registry record
    pub registry_path: Option<PathBuf>,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Maximum number of retries for failed reads
    pub max_read_retries: usize,

    /// Initial retry delay (in milliseconds)
    pub retry_initial_delay_ms: u64,

    /// Maximum retry delay (in milliseconds)
    pub retry_max_delay_ms: u64,

    /// Retry backoff multiplier
    pub retry_multiplier: f64,

    /// Confirmation polling interval (in milliseconds)
    pub tx_poll_interval_ms: u64,

    /// Confirmation wait timeout (in seconds)
    pub tx_timeout_secs: u64,

    /// Ephemeral cache-tier time-to-live (in seconds)
    pub ephemeral_ttl_secs: u64,

    /// Durable registry-tier time-to-live (in seconds)
    pub persistent_ttl_secs: u64,

    /// Delay before re-reading votes after a confirm (in milliseconds)
    pub vote_refresh_delay_ms: u64,
}

impl ClientConfig {
    /// Create a new configuration for the specified network
    pub fn new(network: Network) -> Self {
        Self {
            network,
            rpc_url: network.default_rpc_url().to_string(),
            registry_contract: network.default_registry_contract().to_string(),
            mirror_url: None,
            registry_path: None,
            request_timeout: Duration::from_secs(30),
            max_read_retries: 2,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 5000,
            retry_multiplier: 2.0,
            tx_poll_interval_ms: 1000,
            tx_timeout_secs: 120,
            ephemeral_ttl_secs: 5 * 60,
            persistent_ttl_secs: 30 * 24 * 60 * 60,
            vote_refresh_delay_ms: 2000,
        }
    }

    /// Create configuration for testnet
    pub fn testnet() -> Self {
        Self::new(Network::Testnet)
    }

    /// Create configuration for mainnet
    pub fn mainnet() -> Self {
        Self::new(Network::Mainnet)
    }

    /// Create a custom configuration
    pub fn custom(rpc_url: String, registry_contract: String) -> Result<Self> {
        if rpc_url.is_empty() {
            return Err(RecoveryError::Config(
                "RPC URL cannot be empty".to_string(),
            ));
        }
        if registry_contract.is_empty() {
            return Err(RecoveryError::Config(
                "Registry contract address cannot be empty".to_string(),
            ));
        }

        let mut config = Self::new(Network::Custom);
        config.rpc_url = rpc_url;
        config.registry_contract = registry_contract;
        Ok(config)
    }

    /// Set the persistence-mirror endpoint
    pub fn with_mirror_url(mut self, url: impl Into<String>) -> Self {
        self.mirror_url = Some(url.into());
        self
    }

    /// Set the durable registry file path
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set maximum read retries
    pub fn with_max_read_retries(mut self, max_retries: usize) -> Self {
        self.max_read_retries = max_retries;
        self
    }

    /// Set retry delays
    pub fn with_retry_config(
        mut self,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    ) -> Self {
        self.retry_initial_delay_ms = initial_delay_ms;
        self.retry_max_delay_ms = max_delay_ms;
        self.retry_multiplier = multiplier;
        self
    }

    /// Set confirmation polling configuration
    pub fn with_tx_config(mut self, poll_interval_ms: u64, timeout_secs: u64) -> Self {
        self.tx_poll_interval_ms = poll_interval_ms;
        self.tx_timeout_secs = timeout_secs;
        self
    }

    /// Set cache time-to-live values
    pub fn with_cache_ttls(mut self, ephemeral_secs: u64, persistent_secs: u64) -> Self {
        self.ephemeral_ttl_secs = ephemeral_secs;
        self.persistent_ttl_secs = persistent_secs;
        self
    }

    /// Set the post-confirm vote refresh delay
    pub fn with_vote_refresh_delay(mut self, delay_ms: u64) -> Self {
        self.vote_refresh_delay_ms = delay_ms;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(RecoveryError::Config(
                "RPC URL cannot be empty".to_string(),
            ));
        }
        url::Url::parse(&self.rpc_url)?;
        if let Some(mirror) = &self.mirror_url {
            url::Url::parse(mirror)?;
        }
        if self.registry_contract.is_empty() {
            return Err(RecoveryError::Config(
                "Registry contract address cannot be empty".to_string(),
            ));
        }
        if self.max_read_retries == 0 {
            return Err(RecoveryError::Config(
                "Max read retries must be greater than 0".to_string(),
            ));
        }
        if self.retry_initial_delay_ms == 0 {
            return Err(RecoveryError::Config(
                "Retry initial delay must be greater than 0".to_string(),
            ));
        }
        if self.retry_multiplier <= 1.0 {
            return Err(RecoveryError::Config(
                "Retry multiplier must be greater than 1.0".to_string(),
            ));
        }
        if self.tx_poll_interval_ms == 0 {
            return Err(RecoveryError::Config(
                "Confirmation poll interval must be greater than 0".to_string(),
            ));
        }
        if self.tx_timeout_secs == 0 {
            return Err(RecoveryError::Config(
                "Confirmation timeout must be greater than 0".to_string(),
            ));
        }
        if self.ephemeral_ttl_secs == 0 || self.persistent_ttl_secs == 0 {
            return Err(RecoveryError::Config(
                "Cache TTLs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::testnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_urls() {
        assert!(Network::Testnet.default_rpc_url().contains("testnet"));
        assert!(!Network::Mainnet.default_rpc_url().contains("testnet"));
        assert_eq!(Network::Custom.default_rpc_url(), "");
    }

    #[test]
    fn test_testnet_config() {
        let config = ClientConfig::testnet();
        assert_eq!(config.network, Network::Testnet);
        assert!(config.validate().is_ok());
        assert_eq!(config.max_read_retries, 2);
        assert_eq!(config.ephemeral_ttl_secs, 300);
        assert_eq!(config.persistent_ttl_secs, 2_592_000);
    }

    #[test]
    fn test_custom_config() {
        let config = ClientConfig::custom(
            "https://rpc.example.com".to_string(),
            "0x5c3f1a9e7b2d8c4f6a0e1b3d5c7f9a2b4d6e8c01".to_string(),
        )
        .unwrap();

        assert_eq!(config.network, Network::Custom);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_config_empty_rpc_url() {
        let result = ClientConfig::custom("".to_string(), "0xabc".to_string());
        assert!(result.is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::testnet()
            .with_request_timeout(Duration::from_secs(60))
            .with_max_read_retries(3)
            .with_retry_config(200, 10_000, 2.5)
            .with_tx_config(500, 30)
            .with_cache_ttls(60, 86_400)
            .with_vote_refresh_delay(100)
            .with_mirror_url("https://mirror.example.com/api/wallets");

        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_read_retries, 3);
        assert_eq!(config.retry_initial_delay_ms, 200);
        assert_eq!(config.tx_poll_interval_ms, 500);
        assert_eq!(config.ephemeral_ttl_secs, 60);
        assert_eq!(config.vote_refresh_delay_ms, 100);
        assert!(config.mirror_url.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ClientConfig::testnet();
        assert!(config.validate().is_ok());

        config.max_read_retries = 0;
        assert!(config.validate().is_err());

        config.max_read_retries = 2;
        config.retry_multiplier = 0.5;
        assert!(config.validate().is_err());

        config.retry_multiplier = 2.0;
        config.rpc_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.network, Network::Testnet);
        assert!(config.validate().is_ok());
    }
}
