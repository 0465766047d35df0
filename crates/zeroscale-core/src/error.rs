//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration decoding.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while decoding a registration or daemon configuration.
///
/// Any of these rejects the whole configuration; no partial registration
/// is ever created from a config that fails to decode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("idle timeout must be positive, got {0:?}")]
    NonPositiveTimeout(String),

    #[error("invalid kind list in {annotation}: {reason}")]
    InvalidKindList { annotation: String, reason: String },

    #[error("invalid apiVersion {0:?}")]
    InvalidApiVersion(String),

    #[error("resource kind must not be empty (apiVersion {0:?})")]
    EmptyKind(String),

    #[error("failed to read config file: {0}")]
    Io(String),

    #[error("failed to parse config file: {0}")]
    Toml(String),
}
