//! Configuration loading for the Cadence engine.
//!
//! The canonical configuration lives in `cadence-config.yaml`. Every section
//! and field has a default, so an empty file (or no file) yields a runnable
//! single-threaded setup.

use std::path::Path;

use serde::Deserialize;

/// Environment variable overriding [`ExecutorConfig::pool_size`].
pub const POOL_SIZE_ENV: &str = "CADENCE_POOL_SIZE";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An override from the environment could not be parsed.
    #[error("invalid value for {variable}: {value}")]
    InvalidEnv {
        /// The offending variable.
        variable: &'static str,
        /// Its raw value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CadenceConfig {
    /// Worker pool and tick ordering.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Simulation loop bounds.
    #[serde(default)]
    pub simulation: SimulationSection,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CadenceConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides (`CADENCE_POOL_SIZE`).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.executor.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }
}

/// Tick executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker threads deliberating in parallel.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// When set, agents run in a reproducible shuffled order each tick.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Per-agent deliberation deadline in milliseconds. `None` waits forever.
    #[serde(default)]
    pub unit_timeout_ms: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            seed: None,
            unit_timeout_ms: None,
        }
    }
}

impl ExecutorConfig {
    /// Apply `CADENCE_POOL_SIZE`, if set.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var(POOL_SIZE_ENV) {
            self.pool_size = parse_pool_size(&value)?;
        }
        Ok(())
    }
}

fn parse_pool_size(value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|size| *size > 0)
        .ok_or_else(|| ConfigError::InvalidEnv {
            variable: POOL_SIZE_ENV,
            value: value.to_owned(),
        })
}

/// Simulation loop settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationSection {
    /// Ticks to run. `0` runs until stopped.
    #[serde(default)]
    pub iterations: u64,
}

/// Logging settings for the engine binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn default_pool_size() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_owned()
}
