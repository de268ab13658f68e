//! Pre-flight check and storage locations.

use super::env_reader::EnvReader;
use crate::domain::errors::ConfigError;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct HealthEnvConfig {
    pub required_files: Vec<PathBuf>,
    pub min_free_disk_mb: u64,
    pub storage_path: PathBuf,
    pub check_connectivity: bool,
}

impl HealthEnvConfig {
    pub fn from_env(env: &EnvReader) -> Result<Self, ConfigError> {
        Ok(Self {
            required_files: env.list("REQUIRED_FILES").into_iter().map(PathBuf::from).collect(),
            min_free_disk_mb: env.parse("MIN_FREE_DISK_MB", 1024)?,
            storage_path: env.path("HEALTH_STORAGE_PATH", "."),
            check_connectivity: env.parse_bool("HEALTH_CHECK_CONNECTIVITY", true),
        })
    }

    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_disk_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone)]
pub struct StorageEnvConfig {
    pub parameter_store_path: PathBuf,
    pub run_history_path: PathBuf,
}

impl StorageEnvConfig {
    pub fn from_env(env: &EnvReader) -> Self {
        Self {
            parameter_store_path: env.path("PARAMETER_STORE_PATH", "config/current_parameters.json"),
            run_history_path: env.path("RUN_HISTORY_PATH", "results/run_history.jsonl"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_config() {
        let env = EnvReader::from_pairs(&[
            ("REQUIRED_FILES", "data/es_5m.csv,data/nq_5m.csv"),
            ("MIN_FREE_DISK_MB", "2"),
            ("HEALTH_CHECK_CONNECTIVITY", "false"),
        ]);
        let config = HealthEnvConfig::from_env(&env).unwrap();
        assert_eq!(config.required_files.len(), 2);
        assert_eq!(config.min_free_bytes(), 2 * 1024 * 1024);
        assert!(!config.check_connectivity);
    }
}
