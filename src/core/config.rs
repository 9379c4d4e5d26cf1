use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::compliance::policy::PolicyRecord;
use crate::core::errors::{Result, SentinelError};

/// Ledger node connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Fullnode REST base URL
    #[serde(default = "LedgerConfig::default_node_url")]
    pub node_url: String,

    /// Network label, only used for logging
    #[serde(default = "LedgerConfig::default_network")]
    pub network: String,

    /// Per-request timeout (seconds)
    #[serde(default = "LedgerConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl LedgerConfig {
    fn default_node_url() -> String { "https://fullnode.testnet.aptoslabs.com/v1".to_string() }
    fn default_network() -> String { "testnet".to_string() }
    fn default_request_timeout_secs() -> u64 { 30 }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node_url: Self::default_node_url(),
            network: Self::default_network(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

/// Poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between poll iterations (milliseconds)
    #[serde(default = "MonitorConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Page size requested per poll
    #[serde(default = "MonitorConfig::default_max_transactions_per_query")]
    pub max_transactions_per_query: u32,

    /// Queue depth per async consumer; a full queue holds up the poll loop
    #[serde(default = "MonitorConfig::default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Initial sender allow-list (empty = everything)
    #[serde(default)]
    pub monitored_addresses: Vec<String>,
}

impl MonitorConfig {
    fn default_poll_interval_ms() -> u64 { 5_000 }
    fn default_max_transactions_per_query() -> u32 { 25 }
    fn default_event_bus_capacity() -> usize { 1024 }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval_ms(),
            max_transactions_per_query: Self::default_max_transactions_per_query(),
            event_bus_capacity: Self::default_event_bus_capacity(),
            monitored_addresses: Vec::new(),
        }
    }
}

/// Built-in policy thresholds plus extra policy records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Value ceiling in octas
    #[serde(default = "PolicyConfig::default_max_transaction_value")]
    pub max_transaction_value: u64,

    #[serde(default = "PolicyConfig::default_max_gas")]
    pub max_gas: u64,

    #[serde(default)]
    pub blocked_addresses: Vec<String>,

    #[serde(default)]
    pub suspicious_contracts: Vec<String>,

    /// Additional policies in persisted record form
    #[serde(default)]
    pub extra: Vec<PolicyRecord>,
}

impl PolicyConfig {
    fn default_max_transaction_value() -> u64 { 1_000_000_000_000 }
    fn default_max_gas() -> u64 { 100_000 }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_transaction_value: Self::default_max_transaction_value(),
            max_gas: Self::default_max_gas(),
            blocked_addresses: Vec::new(),
            suspicious_contracts: Vec::new(),
            extra: Vec::new(),
        }
    }
}

/// Alert pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Minimum risk score that raises an alert for a compliant transaction
    #[serde(default = "AlertConfig::default_risk_threshold")]
    pub risk_threshold: u8,

    /// Feed the heuristic anomaly detector into every score
    #[serde(default)]
    pub heuristic_anomalies: bool,
}

impl AlertConfig {
    fn default_risk_threshold() -> u8 { 30 }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            risk_threshold: Self::default_risk_threshold(),
            heuristic_anomalies: false,
        }
    }
}

/// Sentinel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub policies: PolicyConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

impl SentinelConfig {
    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the config: explicit path, then `SENTINEL_CONFIG`, then defaults.
    /// Environment overrides are applied last and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path: Option<PathBuf> = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("SENTINEL_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(p) => {
                info!(path = %p.display(), "Loading sentinel config");
                Self::from_file(&p)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override selected fields from `SENTINEL_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SENTINEL_NODE_URL") {
            self.ledger.node_url = url;
        }
        if let Ok(network) = std::env::var("SENTINEL_NETWORK") {
            self.ledger.network = network;
        }
        if let Some(ms) = env_number::<u64>("SENTINEL_POLL_INTERVAL_MS")? {
            self.monitor.poll_interval_ms = ms;
        }
        if let Some(limit) = env_number::<u32>("SENTINEL_MAX_TX_PER_QUERY")? {
            self.monitor.max_transactions_per_query = limit;
        }
        if let Some(threshold) = env_number::<u8>("SENTINEL_RISK_THRESHOLD")? {
            self.alerts.risk_threshold = threshold;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.ledger.node_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SentinelError::Configuration(format!(
                "node_url must be an http(s) URL, got '{}'",
                url
            )));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(SentinelError::Configuration("poll_interval_ms must be greater than 0".into()));
        }
        if self.monitor.max_transactions_per_query == 0 {
            return Err(SentinelError::Configuration(
                "max_transactions_per_query must be greater than 0".into(),
            ));
        }
        if self.monitor.event_bus_capacity == 0 {
            return Err(SentinelError::Configuration("event_bus_capacity must be greater than 0".into()));
        }
        if self.alerts.risk_threshold > 100 {
            return Err(SentinelError::Configuration("risk_threshold must be between 0 and 100".into()));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SentinelError::Configuration(format!("{} is not a valid number: '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}
