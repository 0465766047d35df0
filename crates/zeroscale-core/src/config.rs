//! Registration configuration decoded from workload annotations, and the
//! daemon's TOML configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};
use crate::fingerprint::ConfigFingerprint;
use crate::types::ResourceKind;

/// Annotation enabling idle scaling; holds the idle timeout.
pub const ANNOTATION_IDLE_TIMEOUT: &str = "zeroscale/idleTimeout";
/// Annotation listing the kinds whose changes count as activity.
pub const ANNOTATION_WATCHED_KINDS: &str = "zeroscale/watchedKinds";
/// Annotation listing the kinds owned by the workload.
pub const ANNOTATION_OWNED_KINDS: &str = "zeroscale/ownedKinds";

/// Earlier `controller-zero-scaler/` keys, still honoured. The
/// `zeroscale/` key wins when both are set.
pub const LEGACY_ANNOTATION_IDLE_TIMEOUT: &str = "controller-zero-scaler/idleTimeout";
pub const LEGACY_ANNOTATION_WATCHED_KINDS: &str = "controller-zero-scaler/watchedKinds";
pub const LEGACY_ANNOTATION_OWNED_KINDS: &str = "controller-zero-scaler/ownedKinds";

/// Typed configuration of one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConfig {
    /// Quiescence period after which the workload scales to zero.
    pub idle_timeout: Duration,
    /// Kinds whose add/update/delete notifications count as activity.
    pub watched_kinds: Vec<ResourceKind>,
    /// Kinds owned by the workload. Carried with the registration but not
    /// watched.
    pub owned_kinds: Vec<ResourceKind>,
}

impl RegistrationConfig {
    /// Build a config, rejecting a zero idle timeout.
    pub fn new(
        idle_timeout: Duration,
        watched_kinds: Vec<ResourceKind>,
        owned_kinds: Vec<ResourceKind>,
    ) -> ConfigResult<Self> {
        if idle_timeout.is_zero() {
            return Err(ConfigError::NonPositiveTimeout(format!("{idle_timeout:?}")));
        }
        Ok(Self {
            idle_timeout,
            watched_kinds,
            owned_kinds,
        })
    }
}

/// The raw annotation texts a registration is decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRegistrationConfig {
    pub idle_timeout: String,
    pub watched_kinds: String,
    pub owned_kinds: String,
}

/// One entry of a kind-list annotation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KindEntry {
    #[serde(rename = "apiVersion")]
    api_version: String,
    #[serde(alias = "Kind")]
    kind: String,
}

impl RawRegistrationConfig {
    /// Extract the raw config from a workload's annotations.
    ///
    /// Returns `None` when the idle-timeout annotation is absent, which
    /// means idle scaling is not enabled for the workload. Missing kind
    /// lists read as empty text.
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Option<Self> {
        let lookup = |key: &str, legacy: &str| {
            annotations.get(key).or_else(|| annotations.get(legacy))
        };
        let idle_timeout =
            lookup(ANNOTATION_IDLE_TIMEOUT, LEGACY_ANNOTATION_IDLE_TIMEOUT)?.clone();
        let text = |key: &str, legacy: &str| lookup(key, legacy).cloned().unwrap_or_default();
        Some(Self {
            idle_timeout,
            watched_kinds: text(ANNOTATION_WATCHED_KINDS, LEGACY_ANNOTATION_WATCHED_KINDS),
            owned_kinds: text(ANNOTATION_OWNED_KINDS, LEGACY_ANNOTATION_OWNED_KINDS),
        })
    }

    /// Fingerprint of the raw text, in timeout/watched/owned order.
    pub fn fingerprint(&self) -> ConfigFingerprint {
        ConfigFingerprint::of_parts([
            self.idle_timeout.as_str(),
            self.watched_kinds.as_str(),
            self.owned_kinds.as_str(),
        ])
    }

    /// Decode into a typed config. Any malformed component rejects the
    /// whole config.
    pub fn parse(&self) -> ConfigResult<RegistrationConfig> {
        let idle_timeout = parse_duration(&self.idle_timeout)?;
        if idle_timeout.is_zero() {
            return Err(ConfigError::NonPositiveTimeout(self.idle_timeout.clone()));
        }

        let watched_kinds = parse_kind_list(ANNOTATION_WATCHED_KINDS, &self.watched_kinds)?;
        let owned_kinds = parse_kind_list(ANNOTATION_OWNED_KINDS, &self.owned_kinds)?;

        RegistrationConfig::new(idle_timeout, watched_kinds, owned_kinds)
    }
}

/// Parse a JSON kind list such as
/// `[{"apiVersion": "apps/v1", "kind": "Deployment"}]`.
///
/// Blank text is an empty list.
pub fn parse_kind_list(annotation: &str, text: &str) -> ConfigResult<Vec<ResourceKind>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<KindEntry> =
        serde_json::from_str(text).map_err(|e| ConfigError::InvalidKindList {
            annotation: annotation.to_string(),
            reason: e.to_string(),
        })?;

    entries
        .iter()
        .map(|e| ResourceKind::from_api_version(&e.api_version, &e.kind))
        .collect()
}

// ── Daemon configuration ───────────────────────────────────────────

/// zeroscaled configuration file (TOML).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub controller: ControllerConfig,
    pub logging: LoggingConfig,
}

/// Which workloads the controller observes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Restrict the controller to one namespace. All namespaces when unset.
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Toml(e.to_string()))
    }
}
