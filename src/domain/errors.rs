use crate::domain::pipeline::run::StageKind;
use thiserror::Error;

/// Missing or malformed configuration. Fatal at startup, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {key}")]
    MissingVar { key: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Why a stage did not succeed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StageFailure {
    #[error("{stage} stage failed: {diagnostic}")]
    Failed { stage: StageKind, diagnostic: String },

    #[error("{stage} stage timed out after {timeout_secs}s")]
    TimedOut { stage: StageKind, timeout_secs: u64 },

    #[error("{stage} stage cancelled by shutdown")]
    Cancelled { stage: StageKind },
}

impl StageFailure {
    pub fn stage(&self) -> StageKind {
        match self {
            StageFailure::Failed { stage, .. }
            | StageFailure::TimedOut { stage, .. }
            | StageFailure::Cancelled { stage } => *stage,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StageFailure::TimedOut { .. })
    }
}

/// Errors pushing parameters to the trading service.
#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("Trading service unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("Trading service rejected parameters: HTTP {status}")]
    Rejected { status: u16 },

    #[error("Trading service is not live: {reason}")]
    NotLive { reason: String },
}

/// Webhook delivery failure. Logged by the notifier and never returned to callers.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Webhook returned HTTP {status}")]
    Status { status: u16 },
}
