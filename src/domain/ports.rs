use crate::domain::errors::PropagationError;
use crate::domain::health::HealthReport;
use crate::domain::notification::Notification;
use crate::domain::optimization::parameter_set::ParameterSet;
use crate::domain::pipeline::run::{PipelineRun, StageKind};
use crate::domain::pipeline::stage::StageOutcome;
use crate::domain::propagation::LivenessStatus;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// One external unit of pipeline work.
///
/// Implementations must be cancel-safe: the runner enforces timeouts and
/// shutdown by dropping the returned future, which has to tear down any
/// child process it owns.
#[async_trait]
pub trait ExternalStage: Send + Sync {
    fn kind(&self) -> StageKind;
    async fn run(&self) -> Result<StageOutcome>;
}

/// Pushes accepted parameters to the live trading service.
#[async_trait]
pub trait ParameterPropagator: Send + Sync {
    async fn check_liveness(&self) -> Result<LivenessStatus, PropagationError>;
    async fn propagate(&self, parameters: &ParameterSet) -> Result<(), PropagationError>;
}

/// Best-effort status broadcast. Never fails and never blocks for long.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> HealthReport;
}

pub trait DiskSpaceProbe: Send + Sync {
    /// Bytes available to unprivileged writers on the volume holding `path`.
    fn available_bytes(&self, path: &Path) -> Result<u64>;
}

/// What the scheduler fires on the weekly trigger.
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    async fn execute_run(&self, cancel: &CancellationToken) -> Result<PipelineRun>;

    /// Re-propagates a set left in the pending slot. `Ok(false)` when nothing was pending.
    async fn retry_pending(&self) -> Result<bool>;

    /// Records a run stopped before any stage executed, e.g. by the health gate.
    async fn abort_run(&self, reason: &str) -> Result<PipelineRun>;
}
