//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and the simulation
//! run so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: cadence_core::config::ConfigError,
    },

    /// The platform could not be created.
    #[error("platform error: {source}")]
    Platform {
        /// The underlying platform error.
        #[from]
        source: cadence_core::platform::PlatformError,
    },

    /// The simulation loop failed.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying engine error.
        #[from]
        source: cadence_core::engine::EngineError,
    },

    /// The `population` section could not be read.
    #[error("population config error: {message}")]
    Population {
        /// Description of the failure.
        message: String,
    },
}
