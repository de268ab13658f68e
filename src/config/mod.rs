//! Configuration module for autotune.
//!
//! Structured configuration loaded once from environment variables at
//! process start and passed into each component. Organized by concern:
//! Scheduler, Pipeline, Propagation, Notification, Health, Storage and
//! Observability.

mod env_reader;
mod health_config;
mod observability_config;
mod pipeline_config;
mod propagation_config;
mod scheduler_config;

pub use env_reader::EnvReader;
pub use health_config::{HealthEnvConfig, StorageEnvConfig};
pub use observability_config::ObservabilityEnvConfig;
pub use pipeline_config::PipelineEnvConfig;
pub use propagation_config::{NotificationEnvConfig, PropagationEnvConfig};
pub use scheduler_config::SchedulerEnvConfig;

use crate::domain::errors::ConfigError;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub scheduler: SchedulerEnvConfig,
    pub pipeline: PipelineEnvConfig,
    pub propagation: PropagationEnvConfig,
    pub notification: NotificationEnvConfig,
    pub health: HealthEnvConfig,
    pub storage: StorageEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(&EnvReader::process())
    }

    pub fn from_reader(env: &EnvReader) -> Result<Self, ConfigError> {
        Ok(Self {
            scheduler: SchedulerEnvConfig::from_env(env)?,
            pipeline: PipelineEnvConfig::from_env(env)?,
            propagation: PropagationEnvConfig::from_env(env)?,
            notification: NotificationEnvConfig::from_env(env)?,
            health: HealthEnvConfig::from_env(env)?,
            storage: StorageEnvConfig::from_env(env),
            observability: ObservabilityEnvConfig::from_env(env),
        })
    }
}
