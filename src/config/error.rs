//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a convoy file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read the configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid YAML or does not match the schema.
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_yml::Error,
    },

    /// A service is declared with `scale: 0`.
    #[error("Service '{service}' has scale 0; scale must be at least 1")]
    ZeroScale {
        /// Offending service name.
        service: String,
    },

    /// A volume entry is not in `hostPath:containerPath[:mode]` form.
    #[error("Service '{service}' has malformed volume entry '{entry}'")]
    InvalidVolume {
        /// Service carrying the entry.
        service: String,
        /// The raw entry.
        entry: String,
    },

    /// A load balancer targets a service that is not declared.
    #[error("Load balancer '{load_balancer}' targets unknown service '{service}'")]
    UnknownService {
        /// Load balancer carrying the reference.
        load_balancer: String,
        /// Undeclared service name.
        service: String,
    },

    /// A load balancer declares no target services.
    #[error("Load balancer '{load_balancer}' has no target services")]
    NoTargets {
        /// Offending load balancer name.
        load_balancer: String,
    },

    /// A load balancer name collides with a service name.
    #[error("Name '{name}' is used for both a service and a load balancer")]
    NameCollision {
        /// The shared name.
        name: String,
    },
}
