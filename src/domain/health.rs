use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a pre-flight health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub failures: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_failures(failures: Vec<String>) -> Self {
        Self {
            healthy: failures.is_empty(),
            failures,
            checked_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> String {
        if self.healthy {
            "All health checks passed".to_string()
        } else {
            self.failures
                .iter()
                .map(|f| format!("• {}", f))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}
