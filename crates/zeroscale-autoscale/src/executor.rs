//! Scale executor — idempotent read-then-conditionally-write.

use std::sync::Arc;

use tracing::debug;

use zeroscale_core::{Replicas, WorkloadIdentity};

use crate::client::WorkloadClient;
use crate::error::ScaleError;

/// What a scale call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// The workload was already at the desired count; nothing was written.
    Unchanged,
    /// The replica count was written.
    Scaled { from: i32, to: i32 },
}

/// Applies replica targets through a [`WorkloadClient`].
///
/// Every call re-reads the workload; no replica count is cached between
/// calls. A write rejected for a stale version is returned as
/// [`ScaleError::Conflict`] and not retried here.
#[derive(Clone)]
pub struct ScaleExecutor {
    client: Arc<dyn WorkloadClient>,
}

impl ScaleExecutor {
    pub fn new(client: Arc<dyn WorkloadClient>) -> Self {
        Self { client }
    }

    pub async fn scale_to(
        &self,
        workload: &WorkloadIdentity,
        desired: Replicas,
    ) -> Result<ScaleOutcome, ScaleError> {
        let current = self.client.get_scale(workload).await?;
        let to = desired.count();

        if current.replicas == to {
            debug!(%workload, replicas = to, "already at desired replicas");
            return Ok(ScaleOutcome::Unchanged);
        }

        self.client.replace_scale(workload, &current, to).await?;
        Ok(ScaleOutcome::Scaled {
            from: current.replicas,
            to,
        })
    }
}
