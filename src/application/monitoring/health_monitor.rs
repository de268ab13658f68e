use crate::config::HealthEnvConfig;
use crate::domain::health::HealthReport;
use crate::domain::ports::{DiskSpaceProbe, HealthProbe, ParameterPropagator};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Pre-flight checks gating every scheduled run.
///
/// Required artifacts are checked by path only, never by content.
pub struct HealthMonitor {
    required_files: Vec<PathBuf>,
    min_free_bytes: u64,
    storage_path: PathBuf,
    disk: Arc<dyn DiskSpaceProbe>,
    connectivity: Option<Arc<dyn ParameterPropagator>>,
}

impl HealthMonitor {
    pub fn new(
        required_files: Vec<PathBuf>,
        min_free_bytes: u64,
        storage_path: PathBuf,
        disk: Arc<dyn DiskSpaceProbe>,
    ) -> Self {
        Self {
            required_files,
            min_free_bytes,
            storage_path,
            disk,
            connectivity: None,
        }
    }

    pub fn from_config(config: &HealthEnvConfig, disk: Arc<dyn DiskSpaceProbe>) -> Self {
        Self::new(
            config.required_files.clone(),
            config.min_free_bytes(),
            config.storage_path.clone(),
            disk,
        )
    }

    /// Also require the trading service to answer its liveness endpoint.
    pub fn with_connectivity(mut self, propagator: Arc<dyn ParameterPropagator>) -> Self {
        self.connectivity = Some(propagator);
        self
    }

    fn check_files(&self, failures: &mut Vec<String>) {
        for file in &self.required_files {
            if !file.exists() {
                failures.push(format!("Missing required file: {}", file.display()));
            }
        }
    }

    fn check_disk(&self, failures: &mut Vec<String>) {
        match self.disk.available_bytes(&self.storage_path) {
            Ok(available) if available < self.min_free_bytes => failures.push(format!(
                "Low disk space: {} MB free (minimum {} MB)",
                available / BYTES_PER_MB,
                self.min_free_bytes / BYTES_PER_MB
            )),
            Ok(_) => {}
            Err(e) => failures.push(format!("Cannot determine free disk space: {:#}", e)),
        }
    }
}

#[async_trait]
impl HealthProbe for HealthMonitor {
    async fn check(&self) -> HealthReport {
        let mut failures = Vec::new();
        self.check_files(&mut failures);
        self.check_disk(&mut failures);

        if let Some(propagator) = &self.connectivity {
            if let Err(e) = propagator.check_liveness().await {
                failures.push(e.to_string());
            }
        }

        let report = HealthReport::from_failures(failures);
        if report.healthy {
            info!("Health check passed");
        } else {
            for failure in &report.failures {
                warn!("Health check: {}", failure);
            }
        }
        report
    }
}
