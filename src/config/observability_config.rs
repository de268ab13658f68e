//! Observability configuration parsing from environment variables.

use super::env_reader::EnvReader;
use std::path::PathBuf;

/// Observability environment configuration
#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    /// Enables the daily-rolling JSON log file when set.
    pub log_dir: Option<PathBuf>,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_env(env: &EnvReader) -> Self {
        Self {
            enabled: env.parse_bool("OBSERVABILITY_ENABLED", true),
            log_dir: env.get("LOG_DIR").map(PathBuf::from),
        }
    }
}
