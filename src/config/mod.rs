//! Layered configuration for the offer consumer.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (offerfold.toml)
//! ```toml
//! [consumer]
//! mode = "optimized"
//! with_cache = false
//! partitions_consumed_concurrently = 3
//!
//! [topic]
//! name = "offers"
//!
//! [store]
//! read_latency_ms = 2
//! write_latency_ms = 5
//! ```
//!
//! Environment variables use the `OFFERFOLD_` prefix with `__` between
//! section and key, e.g. `OFFERFOLD_CONSUMER__MODE=optimized`.

mod defaults;

pub use defaults::*;

use crate::processor::{ProcessingMode, ProcessorOptions};
use crate::store::StoreLatency;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "OFFERFOLD_";

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferfoldConfig {
    pub consumer: ConsumerConfig,
    pub topic: TopicConfig,
    pub store: StoreConfig,
}

impl OfferfoldConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    pub fn load(config_path: Option<&str>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(OfferfoldConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        // Layer 3: CLI overrides
        figment = figment.merge(Serialized::defaults(overrides));

        figment.extract().map_err(ConfigError::from)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            mode: self.consumer.mode,
            with_cache: self.consumer.with_cache,
            concurrent: self.consumer.concurrent,
        }
    }

    pub fn store_latency(&self) -> StoreLatency {
        StoreLatency::from_millis(self.store.read_latency_ms, self.store.write_latency_ms)
    }
}

/// Consumer behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// `normal` or `optimized`
    pub mode: ProcessingMode,
    /// Batch-scoped read cache in normal mode
    pub with_cache: bool,
    /// Fan out across proposition keys in normal mode
    pub concurrent: bool,
    /// Partitions processed at the same time
    pub partitions_consumed_concurrently: usize,
    /// Batches queued per partition
    pub partition_queue_capacity: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::Normal,
            with_cache: false,
            concurrent: false,
            partitions_consumed_concurrently: DEFAULT_PARTITIONS_CONSUMED_CONCURRENTLY,
            partition_queue_capacity: DEFAULT_PARTITION_QUEUE_CAPACITY,
        }
    }
}

/// Topic subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub name: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_TOPIC.to_string(),
        }
    }
}

/// In-memory store simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub read_latency_ms: u64,
    pub write_latency_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            read_latency_ms: DEFAULT_READ_LATENCY_MS,
            write_latency_ms: DEFAULT_WRITE_LATENCY_MS,
        }
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<ConsumerOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ProcessingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions_consumed_concurrently: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}
