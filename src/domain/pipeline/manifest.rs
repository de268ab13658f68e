use crate::domain::optimization::parameter_set::ParameterSet;
use crate::domain::performance::metrics::{BasicMetrics, MetricSet};
use crate::domain::trading::types::TradeRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Succeeded,
    Failed,
}

/// Fields every stage manifest carries. Stage-specific payload is ignored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestHeader {
    pub status: ManifestStatus,
    #[serde(default)]
    pub diagnostic: Option<String>,
}

/// Artifact of the optimize stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeManifest {
    pub status: ManifestStatus,
    #[serde(default)]
    pub diagnostic: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl OptimizeManifest {
    pub fn into_parameter_set(self, source: &str) -> ParameterSet {
        ParameterSet {
            parameters: self.parameters,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            source: source.to_string(),
            score: self.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisSection {
    #[serde(default)]
    pub basic_metrics: Option<BasicMetrics>,
}

/// Artifact of the verify stage: a trade log, a `basic_metrics` summary, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyManifest {
    pub status: ManifestStatus,
    #[serde(default)]
    pub diagnostic: Option<String>,
    #[serde(default)]
    pub trades: Vec<TradeRecord>,
    #[serde(default)]
    pub basic_metrics: Option<BasicMetrics>,
    #[serde(default)]
    pub analysis: Option<AnalysisSection>,
}

impl VerifyManifest {
    pub fn well_formed_trades(&self) -> Vec<TradeRecord> {
        self.trades
            .iter()
            .filter(|t| t.is_well_formed())
            .cloned()
            .collect()
    }

    pub fn malformed_trade_count(&self) -> usize {
        self.trades.iter().filter(|t| !t.is_well_formed()).count()
    }

    /// Top-level `basic_metrics`, falling back to `analysis.basic_metrics`.
    pub fn basic_metrics(&self) -> Option<&BasicMetrics> {
        self.basic_metrics.as_ref().or_else(|| {
            self.analysis
                .as_ref()
                .and_then(|a| a.basic_metrics.as_ref())
        })
    }

    /// Metrics from the trade log when present, otherwise from the summary.
    /// `None` means no metrics are available.
    pub fn metrics(&self, annualization_periods: f64) -> Option<MetricSet> {
        let trades = self.well_formed_trades();
        if !trades.is_empty() {
            return MetricSet::calculate_with_annualization(&trades, annualization_periods);
        }
        self.basic_metrics().and_then(MetricSet::from_basic_metrics)
    }
}

pub fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_manifest_prefers_trades() {
        let json = r#"{
            "status": "succeeded",
            "trades": [
                {"entry_timestamp": "2025-01-06T10:00:00Z", "exit_timestamp": "2025-01-06T11:00:00Z", "return_pct": 0.02, "side": "long"},
                {"entry_timestamp": "2025-01-06T12:00:00Z", "exit_timestamp": "2025-01-06T13:00:00Z", "return_pct": -0.01, "side": "short"}
            ],
            "basic_metrics": {
                "total_trades": 999, "win_rate": 0.1, "profit_factor": 0.5, "total_return": 0.0,
                "max_drawdown": 0.9, "sharpe_ratio": 0.0, "sortino_ratio": 0.0
            }
        }"#;
        let manifest: VerifyManifest = serde_json::from_str(json).unwrap();
        let metrics = manifest.metrics(252.0).unwrap();
        assert_eq!(metrics.total_trades, 2);
    }

    #[test]
    fn test_verify_manifest_nested_basic_metrics() {
        let json = r#"{
            "status": "succeeded",
            "analysis": {"basic_metrics": {
                "total_trades": 320, "win_rate": 0.55, "profit_factor": 2.0, "total_return": 0.6,
                "max_drawdown": 0.2, "sharpe_ratio": 1.4, "sortino_ratio": 1.68
            }}
        }"#;
        let manifest: VerifyManifest = serde_json::from_str(json).unwrap();
        let metrics = manifest.metrics(252.0).unwrap();
        assert_eq!(metrics.total_trades, 320);
        assert!((metrics.calmar_ratio - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_verify_manifest_without_data() {
        let manifest: VerifyManifest = serde_json::from_str(r#"{"status": "succeeded"}"#).unwrap();
        assert!(manifest.metrics(252.0).is_none());
    }

    #[test]
    fn test_malformed_trades_dropped() {
        let json = r#"{
            "status": "succeeded",
            "trades": [
                {"entry_timestamp": "2025-01-06T12:00:00Z", "exit_timestamp": "2025-01-06T10:00:00Z", "return_pct": 0.02, "side": "long"}
            ]
        }"#;
        let manifest: VerifyManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.malformed_trade_count(), 1);
        assert!(manifest.metrics(252.0).is_none());
    }

    #[test]
    fn test_optimize_manifest_to_parameter_set() {
        let json = r#"{
            "status": "succeeded",
            "parameters": {"target_r": 2.4, "swing_len": 3.0},
            "score": 4.2
        }"#;
        let manifest: OptimizeManifest = serde_json::from_str(json).unwrap();
        let params = manifest.into_parameter_set("weekly_auto_optimization");
        assert_eq!(params.get("target_r"), Some(2.4));
        assert_eq!(params.score, 4.2);
        assert_eq!(params.source, "weekly_auto_optimization");
    }
}
