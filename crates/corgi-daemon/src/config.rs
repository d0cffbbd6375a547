//! Configuration file management.
//!
//! Read from `$CORGI_DATA_DIR/config.toml`; every field has a default so a
//! missing file or a partial one is fine.

use std::path::PathBuf;
use std::time::Duration;

use corgi_retry::RetryConfig;
use corgi_settlement::sweep::SweepConfig;
use corgi_types::TokenAmount;
use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    /// Backoff for chain broadcasts and status queries.
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sweep: SweepSchedule,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Chain relayer and bank wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Base URL of the signer/relayer that holds the bank wallet key.
    #[serde(default = "default_chain_endpoint")]
    pub endpoint: String,
    /// Address rewards are paid from.
    #[serde(default)]
    pub bank_wallet_address: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Balance mirror seeded on first start, in whole coins.
    #[serde(default)]
    pub initial_bank_balance_coins: u64,
}

/// Reward rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    #[serde(default = "default_coins_per_corgi")]
    pub coins_per_corgi: u64,
    #[serde(default = "default_max_reward_coins")]
    pub max_reward_coins: u64,
}

/// Reconciliation sweep schedule and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSchedule {
    /// Seconds between sweeps. 0 disables the periodic task.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    #[serde(flatten)]
    pub thresholds: SweepConfig,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log file path. Empty = stderr.
    #[serde(default)]
    pub log_file: String,
}

// Default value functions

fn default_chain_endpoint() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_coins_per_corgi() -> u64 {
    corgi_reward::DEFAULT_COINS_PER_CORGI
}

fn default_max_reward_coins() -> u64 {
    corgi_reward::DEFAULT_MAX_REWARD_COINS
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoint: default_chain_endpoint(),
            bank_wallet_address: String::new(),
            request_timeout_secs: default_request_timeout(),
            initial_bank_balance_coins: 0,
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            coins_per_corgi: default_coins_per_corgi(),
            max_reward_coins: default_max_reward_coins(),
        }
    }
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            thresholds: SweepConfig::default(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: String::new(),
        }
    }
}

impl ChainConfig {
    pub fn initial_bank_balance(&self) -> anyhow::Result<TokenAmount> {
        TokenAmount::from_coins(self.initial_bank_balance_coins).ok_or_else(|| {
            anyhow::anyhow!(
                "initial bank balance of {} coins overflows",
                self.initial_bank_balance_coins
            )
        })
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reject settings the daemon cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.retry.validate()?;
        if self.chain.bank_wallet_address.trim().is_empty() {
            anyhow::bail!("chain.bank_wallet_address must be set");
        }
        corgi_types::validate_wallet_address(&self.chain.bank_wallet_address)?;
        self.chain.initial_bank_balance()?;

        // A broadcast still inside its retry budget must never look orphaned.
        let broadcast_budget = Duration::from_secs(self.chain.request_timeout_secs)
            * self.retry.max_attempts
            + self.retry.max_total_delay();
        if Duration::from_secs(self.sweep.thresholds.orphan_after_secs) <= broadcast_budget {
            anyhow::bail!(
                "sweep.orphan_after_secs ({}) must exceed the longest broadcast ({:.1}s)",
                self.sweep.thresholds.orphan_after_secs,
                broadcast_budget.as_secs_f64()
            );
        }
        Ok(())
    }

    /// tracing-subscriber directive for our crates.
    pub fn log_directive(&self) -> String {
        format!("corgi={}", self.advanced.log_level)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("CORGI_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".corgi-buddy"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/corgi-buddy"))
    }
}
