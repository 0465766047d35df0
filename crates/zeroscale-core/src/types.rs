//! Identity types shared across zeroscale crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Namespace-scoped identity of the scaled workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub namespace: String,
    pub name: String,
}

impl WorkloadIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A (group, version, kind) triple naming an API resource type.
///
/// The core API group is represented by an empty `group`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceKind {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Build a kind from an `apiVersion` string (`group/version` or a bare
    /// core-group `version`) and a kind name.
    pub fn from_api_version(api_version: &str, kind: &str) -> ConfigResult<Self> {
        let api_version = api_version.trim();
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };

        if version.is_empty()
            || version.contains('/')
            || (api_version.contains('/') && group.is_empty())
        {
            return Err(ConfigError::InvalidApiVersion(api_version.to_string()));
        }

        let kind = kind.trim();
        if kind.is_empty() {
            return Err(ConfigError::EmptyKind(api_version.to_string()));
        }

        Ok(Self::new(group, version, kind))
    }

    /// Render the `apiVersion` string for this kind.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// The two replica counts the autoscaler ever asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Replicas {
    Zero,
    One,
}

impl Replicas {
    pub fn count(self) -> i32 {
        match self {
            Replicas::Zero => 0,
            Replicas::One => 1,
        }
    }
}

impl From<Replicas> for i32 {
    fn from(r: Replicas) -> i32 {
        r.count()
    }
}

impl fmt::Display for Replicas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count())
    }
}
