use crate::domain::performance::metrics::MetricSet;
use crate::domain::pipeline::manifest::{VerifyManifest, read_manifest};
use crate::domain::validation::constraints::{ConstraintSet, GateVerdict};
use anyhow::Result;
use std::path::Path;
use tracing::warn;

/// Metrics and gate verdict for one verify report.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// `None` when the report carries neither trades nor a summary.
    pub metrics: Option<MetricSet>,
    pub verdict: Option<GateVerdict>,
    pub malformed_trades: usize,
}

impl Analysis {
    pub fn evaluate(
        manifest: &VerifyManifest,
        constraints: &ConstraintSet,
        annualization_periods: f64,
    ) -> Self {
        let malformed_trades = manifest.malformed_trade_count();
        if malformed_trades > 0 {
            warn!("Ignoring {} malformed trade records", malformed_trades);
        }

        let metrics = manifest.metrics(annualization_periods);
        let verdict = metrics.as_ref().map(|m| constraints.evaluate(m));
        Self {
            metrics,
            verdict,
            malformed_trades,
        }
    }

    pub fn accepted(&self) -> bool {
        self.verdict.as_ref().is_some_and(|v| v.accepted)
    }
}

/// Reads a verify manifest from disk and runs the metrics engine and gate on it.
pub fn analyze_manifest(
    path: &Path,
    constraints: &ConstraintSet,
    annualization_periods: f64,
) -> Result<Analysis> {
    let manifest: VerifyManifest = read_manifest(path)?;
    Ok(Analysis::evaluate(&manifest, constraints, annualization_periods))
}
