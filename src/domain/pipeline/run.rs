use crate::domain::errors::StageFailure;
use crate::domain::optimization::parameter_set::ParameterSet;
use crate::domain::performance::metrics::MetricSet;
use crate::domain::validation::constraints::GateVerdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Optimize,
    Verify,
    Analyze,
    Propagate,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Optimize,
        StageKind::Verify,
        StageKind::Analyze,
        StageKind::Propagate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Optimize => "optimize",
            StageKind::Verify => "verify",
            StageKind::Analyze => "analyze",
            StageKind::Propagate => "propagate",
        }
    }

    /// Run state while this stage executes.
    pub fn running_state(&self) -> RunState {
        match self {
            StageKind::Optimize => RunState::Optimizing,
            StageKind::Verify => RunState::Verifying,
            StageKind::Analyze => RunState::Analyzing,
            StageKind::Propagate => RunState::Propagating,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub diagnostic: Option<String>,
}

impl StageRecord {
    fn pending(stage: StageKind) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            diagnostic: None,
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Run state machine:
/// `Idle -> Optimizing -> Verifying -> Analyzing -> Propagating -> {Accepted, Rejected, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Optimizing,
    Verifying,
    Analyzing,
    Propagating,
    Accepted,
    Rejected,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Accepted | RunState::Rejected | RunState::Failed
        )
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Optimizing) => true,
            (Optimizing, Verifying) => true,
            (Verifying, Analyzing) => true,
            (Analyzing, Propagating) | (Analyzing, Rejected) => true,
            (Propagating, Accepted) => true,
            // Any non-terminal state may fail, including a health gate abort from Idle.
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Accepted,
    Rejected,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Accepted => "accepted",
            RunOutcome::Rejected => "rejected",
            RunOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Invalid run transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub to: RunState,
}

/// One end-to-end execution of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub stages: Vec<StageRecord>,
    pub parameters: Option<ParameterSet>,
    pub metrics: Option<MetricSet>,
    pub verdict: Option<GateVerdict>,
    pub diagnostic: Option<String>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::Idle,
            stages: StageKind::ALL.iter().map(|s| StageRecord::pending(*s)).collect(),
            parameters: None,
            metrics: None,
            verdict: None,
            diagnostic: None,
        }
    }

    pub fn transition(&mut self, next: RunState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == kind)
    }

    fn stage_mut(&mut self, kind: StageKind) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|s| s.stage == kind)
    }

    pub fn begin_stage(&mut self, kind: StageKind) -> Result<(), InvalidTransition> {
        self.transition(kind.running_state())?;
        if let Some(record) = self.stage_mut(kind) {
            record.status = StageStatus::Running;
            record.started_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn succeed_stage(&mut self, kind: StageKind, diagnostic: Option<String>) {
        if let Some(record) = self.stage_mut(kind) {
            record.status = StageStatus::Succeeded;
            record.finished_at = Some(Utc::now());
            record.diagnostic = diagnostic;
        }
    }

    /// Marks the failing stage and moves the run to `Failed`.
    pub fn fail_stage(&mut self, failure: &StageFailure) -> Result<(), InvalidTransition> {
        let status = if failure.is_timeout() {
            StageStatus::TimedOut
        } else {
            StageStatus::Failed
        };
        if let Some(record) = self.stage_mut(failure.stage()) {
            record.status = status;
            record.finished_at = Some(Utc::now());
            record.diagnostic = Some(failure.to_string());
        }
        self.diagnostic = Some(failure.to_string());
        self.transition(RunState::Failed)
    }

    /// Fails the run without attributing it to a stage.
    pub fn abort(&mut self, reason: &str) -> Result<(), InvalidTransition> {
        self.diagnostic = Some(reason.to_string());
        self.transition(RunState::Failed)
    }

    pub fn reject(&mut self, reason: &str) -> Result<(), InvalidTransition> {
        self.diagnostic = Some(reason.to_string());
        self.transition(RunState::Rejected)
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        match self.state {
            RunState::Accepted => Some(RunOutcome::Accepted),
            RunState::Rejected => Some(RunOutcome::Rejected),
            RunState::Failed => Some(RunOutcome::Failed),
            _ => None,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}
