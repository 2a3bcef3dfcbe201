//! Error types for the gateway process.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the gateway's startup path and its I/O helpers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Socket bind, send or receive failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid environment configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Discovery backend unreachable or returned garbage
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Status endpoint failure
    #[error("admin error: {0}")]
    Admin(#[from] relaygate_admin::AdminError),
}

/// Discovery-level errors. Never escape the prober: they are logged and
/// treated as an empty candidate set.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Registry request failed or returned a non-success status
    #[error("registry request failed: {0}")]
    Registry(#[from] reqwest::Error),

    /// Name resolution failed
    #[error("failed to resolve {name}: {source}")]
    Resolve {
        /// The name being resolved
        name: String,
        /// Underlying resolver error
        source: std::io::Error,
    },

    /// The attempt exceeded its deadline
    #[error("discovery timed out after {0} ms")]
    Timeout(u64),
}

/// Convenience alias for gateway results.
pub type Result<T> = std::result::Result<T, GatewayError>;
