//! zeroscale-core — shared types for the zeroscale idle autoscaler.
//!
//! Defines the workload and resource-kind identities, the typed
//! `RegistrationConfig` decoded from workload annotations, the
//! `ConfigFingerprint` used to detect configuration drift, and the
//! daemon's TOML configuration.

pub mod config;
pub mod duration;
pub mod error;
pub mod fingerprint;
pub mod types;

pub use config::{DaemonConfig, RawRegistrationConfig, RegistrationConfig};
pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
pub use fingerprint::ConfigFingerprint;
pub use types::*;
