use thiserror::Error;

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while bootstrapping shared infrastructure
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unusable configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A global subscriber was already installed by someone else
    #[error("Logging already initialized: {0}")]
    LoggingInitialized(String),
}
