//! AutoScaler — the per-workload idle-timeout engine.
//!
//! Each registered workload gets one `AutoScaler`. Its control loop owns
//! all decision state and services exactly one input per iteration:
//!
//! ```text
//! loop {
//!   select (shutdown first) {
//!     shutdown requested      → Cancelled, exit
//!     activity signal         → desired = 1
//!     idle_timeout elapsed    → desired = 0
//!   }
//!   scale_to(desired)          (failures logged, retried next tick)
//!   idle timer re-armed
//! }
//! ```
//!
//! The loop is level-triggered: the idle timer is re-armed after every
//! decision, so an idle workload is re-checked every `idle_timeout` and a
//! failed write is naturally retried.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use zeroscale_core::{RegistrationConfig, Replicas, WorkloadIdentity};

use crate::activity::{ActivityMonitor, activity_channel};
use crate::client::{ActivitySource, WorkloadClient};
use crate::executor::{ScaleExecutor, ScaleOutcome};
use crate::shutdown;

/// Observable state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No decision made yet.
    Starting,
    /// Last decision was one replica.
    Active,
    /// Last decision was zero replicas.
    Idle,
    /// Shut down; terminal.
    Cancelled,
}

impl EngineState {
    fn for_target(target: Replicas) -> Self {
        match target {
            Replicas::One => EngineState::Active,
            Replicas::Zero => EngineState::Idle,
        }
    }
}

/// Idle-timeout autoscaler for a single workload.
pub struct AutoScaler {
    workload: WorkloadIdentity,
    config: RegistrationConfig,
    executor: ScaleExecutor,
    source: Arc<dyn ActivitySource>,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<EngineState>,
}

impl AutoScaler {
    /// Create an engine. Nothing runs until [`AutoScaler::start`].
    pub fn new(
        workload: WorkloadIdentity,
        config: RegistrationConfig,
        client: Arc<dyn WorkloadClient>,
        source: Arc<dyn ActivitySource>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Starting);
        Self {
            workload,
            config,
            executor: ScaleExecutor::new(client),
            source,
            shutdown,
            state,
        }
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Spawn the watch-delivery tasks and the control loop.
    ///
    /// Returns before the first decision is made. The returned handle is
    /// never required for shutdown; teardown is driven by the shutdown
    /// channel alone.
    pub fn start(self) -> JoinHandle<()> {
        let (signal, activity) = activity_channel();

        ActivityMonitor::new(self.workload.clone(), self.source.clone(), signal)
            .spawn(&self.config.watched_kinds, self.shutdown.clone());

        tokio::spawn(self.run(activity))
    }

    async fn run(mut self, mut activity: mpsc::Receiver<()>) {
        info!(
            workload = %self.workload,
            idle_timeout = ?self.config.idle_timeout,
            watched_kinds = self.config.watched_kinds.len(),
            owned_kinds = self.config.owned_kinds.len(),
            "autoscaler started"
        );

        loop {
            let target = tokio::select! {
                biased;
                _ = shutdown::requested(&mut self.shutdown) => break,
                Some(()) = activity.recv() => {
                    debug!(workload = %self.workload, "activity signal received");
                    Replicas::One
                }
                _ = tokio::time::sleep(self.config.idle_timeout) => {
                    debug!(workload = %self.workload, "idle timeout elapsed");
                    Replicas::Zero
                }
            };

            // A pending signal must not outlive a cancellation.
            if shutdown::is_requested(&self.shutdown) {
                break;
            }

            self.apply(target).await;
        }

        self.state.send_replace(EngineState::Cancelled);
        info!(workload = %self.workload, "autoscaler cancelled");
    }

    async fn apply(&self, target: Replicas) {
        self.state.send_replace(EngineState::for_target(target));

        match self.executor.scale_to(&self.workload, target).await {
            Ok(ScaleOutcome::Scaled { from, to }) => {
                info!(workload = %self.workload, from, to, "scaled workload");
            }
            Ok(ScaleOutcome::Unchanged) => {}
            Err(e) => {
                warn!(
                    workload = %self.workload,
                    target = %target,
                    error = %e,
                    "scale attempt failed, will retry on next tick"
                );
            }
        }
    }
}
