//! Engine binary for the Cadence deliberation engine.
//!
//! Runs a population of trading agents on the tick executor until every
//! trader has met its sales target or the iteration limit is reached.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `cadence-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Create the platform (executor + messenger)
//! 4. Spawn the trader population
//! 5. Register tick hooks and run the simulation
//! 6. Log the summary

mod error;
mod hooks;
mod population;

use std::path::Path;
use std::sync::Arc;

use cadence_core::config::{CadenceConfig, LoggingConfig};
use cadence_core::engine::SimulationEngine;
use cadence_core::platform::Platform;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::hooks::{StopWhenIdle, TickLogger};
use crate::population::{PopulationConfig, TradeAction};

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "cadence-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration loading, platform creation, or the
/// simulation itself fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        pool_size = config.executor.pool_size,
        seed = ?config.executor.seed,
        iterations = config.simulation.iterations,
        "cadence-engine starting"
    );

    // 3. Create the platform.
    let platform: Arc<Platform<TradeAction>> =
        Arc::new(Platform::new(&config.executor).map_err(EngineError::from)?);

    // 4. Spawn traders.
    let population = load_population_config()?;
    let traders = population::spawn_traders(&population, &platform);

    // 5. Run the simulation.
    let mut engine = SimulationEngine::new(Arc::clone(&platform), config.simulation.iterations);
    let stop = engine.stop_handle();
    engine.register_hook(Arc::new(TickLogger));
    engine.register_hook(Arc::new(StopWhenIdle::new(Arc::clone(&platform), stop)));
    let summary = engine.run().map_err(EngineError::from)?;

    // 6. Log results.
    info!(
        traders = traders.len(),
        summary = %serde_json::to_string(&summary)?,
        "cadence-engine shutdown complete"
    );
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Load the engine configuration, falling back to defaults when the file
/// is absent.
fn load_config() -> Result<CadenceConfig, EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok(CadenceConfig::from_file(config_path)?)
    } else {
        let mut config = CadenceConfig::default();
        config.executor.apply_env_overrides()?;
        Ok(config)
    }
}

/// Load the `population` section of the configuration file, if any.
fn load_population_config() -> Result<PopulationConfig, EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if !config_path.exists() {
        info!("Config file not found, using default population");
        return Ok(PopulationConfig::default());
    }
    let contents = std::fs::read_to_string(config_path).map_err(|e| EngineError::Population {
        message: format!("failed to read config file: {e}"),
    })?;
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| EngineError::Population {
        message: format!("failed to parse config YAML: {e}"),
    })?;
    raw.get("population").map_or_else(
        || Ok(PopulationConfig::default()),
        |section| {
            serde_yml::from_value(section.clone()).map_err(|e| EngineError::Population {
                message: format!("failed to parse population config: {e}"),
            })
        },
    )
}
