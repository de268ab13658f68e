//! Push-based metrics reporter for autotune
//!
//! Outputs one structured JSON line to stdout after every scheduler job.
//!
//! **Security**: This system only SENDS data, never accepts requests.

use crate::domain::pipeline::run::{PipelineRun, RunOutcome};
use crate::infrastructure::observability::metrics::Metrics;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};

/// Metrics snapshot for JSON output
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub runs: RunCounts,
    pub health_check_failures: u64,
    pub notification_failures: u64,
    pub propagation_failures: u64,
    pub scheduler_errors: u64,
    pub last_run: Option<LastRunSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct RunCounts {
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRunSnapshot {
    pub id: String,
    pub outcome: Option<RunOutcome>,
    pub composite_score: Option<f64>,
    pub duration_seconds: f64,
    pub finished_at: Option<String>,
}

impl From<&PipelineRun> for LastRunSnapshot {
    fn from(run: &PipelineRun) -> Self {
        Self {
            id: run.id.to_string(),
            outcome: run.outcome(),
            composite_score: run.metrics.as_ref().map(|m| m.composite_score),
            duration_seconds: run.duration_secs(),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Push-based metrics reporter
///
/// No HTTP server, no incoming connections - only outbound data.
pub struct MetricsReporter {
    metrics: Metrics,
    start_time: Instant,
    last_run: Mutex<Option<LastRunSnapshot>>,
}

impl MetricsReporter {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
            start_time: Instant::now(),
            last_run: Mutex::new(None),
        }
    }

    pub fn record_run(&self, run: &PipelineRun) {
        if let Ok(mut last) = self.last_run.lock() {
            *last = Some(LastRunSnapshot::from(run));
        }
    }

    /// Print the current snapshot with the `METRICS_JSON:` prefix.
    pub fn report(&self) {
        let snapshot = self.collect_snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                // Use a special prefix so logs can be easily filtered
                println!("METRICS_JSON:{}", json);
                info!(
                    "Runs: {} accepted / {} rejected / {} failed | Uptime: {}s",
                    snapshot.runs.accepted,
                    snapshot.runs.rejected,
                    snapshot.runs.failed,
                    snapshot.uptime_seconds
                );
            }
            Err(e) => warn!("Failed to serialize metrics: {}", e),
        }
    }

    pub fn collect_snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        self.metrics.uptime_seconds.set(uptime as f64);

        let last_run = self.last_run.lock().ok().and_then(|l| l.clone());

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            runs: RunCounts {
                accepted: self.metrics.runs(RunOutcome::Accepted.as_str()),
                rejected: self.metrics.runs(RunOutcome::Rejected.as_str()),
                failed: self.metrics.runs(RunOutcome::Failed.as_str()),
            },
            health_check_failures: self.metrics.health_check_failures_total.get() as u64,
            notification_failures: self.metrics.notification_failures_total.get() as u64,
            propagation_failures: self.metrics.propagation_failures_total.get() as u64,
            scheduler_errors: self.metrics.scheduler_errors_total.get() as u64,
            last_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_runs() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        let reporter = MetricsReporter::new(metrics.clone());

        let mut run = PipelineRun::new();
        run.abort("verify data missing").unwrap();
        metrics.inc_runs(RunOutcome::Failed.as_str());
        reporter.record_run(&run);

        let snapshot = reporter.collect_snapshot();
        assert_eq!(snapshot.runs.failed, 1);
        assert_eq!(snapshot.runs.accepted, 0);
        let last = snapshot.last_run.expect("last run recorded");
        assert_eq!(last.outcome, Some(RunOutcome::Failed));
        assert!(last.composite_score.is_none());

        let json = serde_json::to_string(&reporter.collect_snapshot()).expect("Failed to serialize");
        assert!(json.contains("\"failed\":1"));
    }
}
