//! Autoscaler error types.

use thiserror::Error;

use zeroscale_core::{ConfigError, WorkloadIdentity};

/// Result type alias for registration operations.
pub type AutoscaleResult<T> = Result<T, AutoscaleError>;

/// Errors surfaced to callers of the registration store and reconciler.
///
/// Errors inside a running engine never reach this type; they are logged
/// and absorbed by the engine loop.
#[derive(Debug, Error)]
pub enum AutoscaleError {
    #[error("workload already registered: {0}")]
    AlreadyRegistered(WorkloadIdentity),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures of a single read-then-write scale operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScaleError {
    #[error("workload not found: {0}")]
    NotFound(String),

    #[error("conflicting update to {0}: resource version is stale")]
    Conflict(String),

    #[error("api error: {0}")]
    Api(String),
}

/// Failures opening or reading a watch on one resource kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("failed to establish watch for {kind}: {reason}")]
    Establish { kind: String, reason: String },

    #[error("watch stream error: {0}")]
    Stream(String),
}
