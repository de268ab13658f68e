//! Prometheus metrics definitions for autotune
//!
//! All metrics use the `autotune_` prefix and are read-only.

use prometheus::{
    Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics for the optimization pipeline
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Finished pipeline runs by outcome
    pub runs_total: CounterVec,
    /// Stage wall time in seconds
    pub stage_duration_seconds: HistogramVec,
    /// Stage failures by stage and reason (failed, timeout, cancelled)
    pub stage_failures_total: CounterVec,
    /// Composite score of the last analyzed run
    pub last_composite_score: Gauge,
    /// Unix time of the last finished run
    pub last_run_timestamp: Gauge,
    pub health_check_failures_total: Counter,
    pub notification_failures_total: Counter,
    pub propagation_failures_total: Counter,
    /// Errors and panics caught by the scheduler loop
    pub scheduler_errors_total: Counter,
    pub uptime_seconds: Gauge,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let runs_total = CounterVec::new(
            Opts::new("autotune_runs_total", "Finished pipeline runs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let stage_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "autotune_stage_duration_seconds",
                "Pipeline stage duration in seconds",
            )
            .buckets(vec![
                0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0,
            ]),
            &["stage"],
        )?;
        registry.register(Box::new(stage_duration_seconds.clone()))?;

        let stage_failures_total = CounterVec::new(
            Opts::new(
                "autotune_stage_failures_total",
                "Stage failures by stage and reason",
            ),
            &["stage", "reason"],
        )?;
        registry.register(Box::new(stage_failures_total.clone()))?;

        let last_composite_score = Gauge::with_opts(Opts::new(
            "autotune_last_composite_score",
            "Composite score of the last analyzed run",
        ))?;
        registry.register(Box::new(last_composite_score.clone()))?;

        let last_run_timestamp = Gauge::with_opts(Opts::new(
            "autotune_last_run_timestamp",
            "Unix timestamp of the last finished run",
        ))?;
        registry.register(Box::new(last_run_timestamp.clone()))?;

        let health_check_failures_total = Counter::with_opts(Opts::new(
            "autotune_health_check_failures_total",
            "Health checks that reported at least one failure",
        ))?;
        registry.register(Box::new(health_check_failures_total.clone()))?;

        let notification_failures_total = Counter::with_opts(Opts::new(
            "autotune_notification_failures_total",
            "Notifications that could not be delivered",
        ))?;
        registry.register(Box::new(notification_failures_total.clone()))?;

        let propagation_failures_total = Counter::with_opts(Opts::new(
            "autotune_propagation_failures_total",
            "Failed attempts to push parameters to the trading service",
        ))?;
        registry.register(Box::new(propagation_failures_total.clone()))?;

        let scheduler_errors_total = Counter::with_opts(Opts::new(
            "autotune_scheduler_errors_total",
            "Errors and panics caught by the scheduler loop",
        ))?;
        registry.register(Box::new(scheduler_errors_total.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "autotune_uptime_seconds",
            "Scheduler uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            runs_total,
            stage_duration_seconds,
            stage_failures_total,
            last_composite_score,
            last_run_timestamp,
            health_check_failures_total,
            notification_failures_total,
            propagation_failures_total,
            scheduler_errors_total,
            uptime_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_runs(&self, outcome: &str) {
        self.runs_total.with_label_values(&[outcome]).inc();
    }

    pub fn runs(&self, outcome: &str) -> u64 {
        self.runs_total.with_label_values(&[outcome]).get() as u64
    }

    pub fn observe_stage(&self, stage: &str, seconds: f64) {
        self.stage_duration_seconds
            .with_label_values(&[stage])
            .observe(seconds);
    }

    pub fn inc_stage_failure(&self, stage: &str, reason: &str) {
        self.stage_failures_total
            .with_label_values(&[stage, reason])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.inc_runs("accepted");
        assert!(metrics.render().contains("autotune_runs_total"));
    }

    #[test]
    fn test_run_counter_by_outcome() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.inc_runs("rejected");
        metrics.inc_runs("rejected");
        metrics.inc_runs("failed");
        assert_eq!(metrics.runs("rejected"), 2);
        assert_eq!(metrics.runs("failed"), 1);
        assert_eq!(metrics.runs("accepted"), 0);
    }

    #[test]
    fn test_stage_histogram() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.observe_stage("verify", 42.0);
        metrics.inc_stage_failure("optimize", "timeout");
        let output = metrics.render();
        assert!(output.contains("autotune_stage_duration_seconds"));
        assert!(output.contains("reason=\"timeout\""));
    }
}
