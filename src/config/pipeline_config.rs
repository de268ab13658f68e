//! Stage commands, artifacts, timeouts and acceptance constraints.

use super::env_reader::EnvReader;
use crate::domain::errors::ConfigError;
use crate::domain::performance::metrics::DEFAULT_ANNUALIZATION_PERIODS;
use crate::domain::validation::constraints::ConstraintSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineEnvConfig {
    pub optimize_command: String,
    pub verify_command: String,
    pub optimize_manifest: PathBuf,
    pub verify_manifest: PathBuf,
    pub workdir: PathBuf,

    // Stage budgets
    pub optimize_timeout_secs: u64,
    pub verify_timeout_secs: u64,
    pub analyze_timeout_secs: u64,
    pub propagate_timeout_secs: u64,

    pub constraints_path: Option<PathBuf>,
    pub annualization_periods: f64,
}

impl PipelineEnvConfig {
    pub fn from_env(env: &EnvReader) -> Result<Self, ConfigError> {
        let annualization_periods =
            env.parse("ANNUALIZATION_PERIODS", DEFAULT_ANNUALIZATION_PERIODS)?;
        if !(annualization_periods > 0.0 && annualization_periods.is_finite()) {
            return Err(ConfigError::InvalidValue {
                key: "ANNUALIZATION_PERIODS".to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        Ok(Self {
            optimize_command: env.string("OPTIMIZE_COMMAND", "python run_optimization.py"),
            verify_command: env.string("VERIFY_COMMAND", "python run_full_backtest.py"),
            optimize_manifest: env.path("OPTIMIZE_MANIFEST", "results/optimize_manifest.json"),
            verify_manifest: env.path("VERIFY_MANIFEST", "results/verify_manifest.json"),
            workdir: env.path("STAGE_WORKDIR", "."),
            optimize_timeout_secs: env.parse("OPTIMIZE_TIMEOUT_SECONDS", 1800)?,
            verify_timeout_secs: env.parse("VERIFY_TIMEOUT_SECONDS", 600)?,
            analyze_timeout_secs: env.parse("ANALYZE_TIMEOUT_SECONDS", 60)?,
            propagate_timeout_secs: env.parse("PROPAGATE_TIMEOUT_SECONDS", 30)?,
            constraints_path: env.get("CONSTRAINTS_CONFIG").map(PathBuf::from),
            annualization_periods,
        })
    }

    /// Constraints from `CONSTRAINTS_CONFIG`, or the built-in set.
    pub fn load_constraints(&self) -> Result<ConstraintSet, ConfigError> {
        match &self.constraints_path {
            Some(path) => ConstraintSet::load(path),
            None => Ok(ConstraintSet::default()),
        }
    }

    pub fn optimize_timeout(&self) -> Duration {
        Duration::from_secs(self.optimize_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_secs(self.analyze_timeout_secs)
    }

    pub fn propagate_timeout(&self) -> Duration {
        Duration::from_secs(self.propagate_timeout_secs)
    }
}
