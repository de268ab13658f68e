use crate::domain::errors::ConfigError;
use crate::domain::performance::metrics::MetricSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Metric a constraint reads from a `MetricSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    TotalTrades,
    WinRate,
    ProfitFactor,
    TotalReturn,
    SharpeRatio,
    SortinoRatio,
    CalmarRatio,
    Sqn,
    MaxDrawdown,
    Expectancy,
    KellyFraction,
    CompositeScore,
}

impl MetricKind {
    pub fn value_of(&self, metrics: &MetricSet) -> f64 {
        match self {
            MetricKind::TotalTrades => metrics.total_trades as f64,
            MetricKind::WinRate => metrics.win_rate,
            MetricKind::ProfitFactor => metrics.profit_factor,
            MetricKind::TotalReturn => metrics.total_return,
            MetricKind::SharpeRatio => metrics.sharpe_ratio,
            MetricKind::SortinoRatio => metrics.sortino_ratio,
            MetricKind::CalmarRatio => metrics.calmar_ratio,
            MetricKind::Sqn => metrics.sqn,
            MetricKind::MaxDrawdown => metrics.max_drawdown,
            MetricKind::Expectancy => metrics.expectancy,
            MetricKind::KellyFraction => metrics.kelly_fraction,
            MetricKind::CompositeScore => metrics.composite_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">=")]
    AtLeast,
    #[serde(rename = ">")]
    Above,
    #[serde(rename = "<=")]
    AtMost,
    #[serde(rename = "<")]
    Below,
}

impl Comparator {
    /// NaN never satisfies a comparator.
    pub fn holds(&self, actual: f64, threshold: f64) -> bool {
        match self {
            Comparator::AtLeast => actual >= threshold,
            Comparator::Above => actual > threshold,
            Comparator::AtMost => actual <= threshold,
            Comparator::Below => actual < threshold,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::AtLeast => ">=",
            Comparator::Above => ">",
            Comparator::AtMost => "<=",
            Comparator::Below => "<",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub metric: MetricKind,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl Constraint {
    pub fn new(name: &str, metric: MetricKind, comparator: Comparator, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            metric,
            comparator,
            threshold,
        }
    }

    pub fn evaluate(&self, metrics: &MetricSet) -> ConstraintResult {
        let actual = self.metric.value_of(metrics);
        ConstraintResult {
            name: self.name.clone(),
            actual,
            comparator: self.comparator,
            threshold: self.threshold,
            passed: self.comparator.holds(actual, self.threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintResult {
    pub name: String,
    pub actual: f64,
    pub comparator: Comparator,
    pub threshold: f64,
    pub passed: bool,
}

impl fmt::Display for ConstraintResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {:.3} {} {}",
            if self.passed { "✅" } else { "❌" },
            self.name,
            self.actual,
            self.comparator,
            self.threshold
        )
    }
}

/// Aggregate decision of the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub results: Vec<ConstraintResult>,
    pub passed_count: usize,
    pub required: usize,
    pub accepted: bool,
}

impl GateVerdict {
    pub fn failed_constraints(&self) -> impl Iterator<Item = &ConstraintResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn summary(&self) -> String {
        format!(
            "{}/{} constraints passed (need {})",
            self.passed_count,
            self.results.len(),
            self.required
        )
    }
}

/// Named thresholds plus the minimum number that must pass.
///
/// `min_passing` defaults to a strict majority of the defined constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    #[serde(default)]
    pub min_passing: Option<usize>,
    pub constraints: Vec<Constraint>,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            min_passing: Some(4),
            constraints: vec![
                Constraint::new("profit_factor", MetricKind::ProfitFactor, Comparator::AtLeast, 1.8),
                Constraint::new("sortino", MetricKind::SortinoRatio, Comparator::AtLeast, 1.5),
                Constraint::new("calmar", MetricKind::CalmarRatio, Comparator::AtLeast, 1.5),
                Constraint::new("sqn", MetricKind::Sqn, Comparator::AtLeast, 2.0),
                Constraint::new("max_drawdown", MetricKind::MaxDrawdown, Comparator::AtMost, 0.30),
                Constraint::new("min_trades", MetricKind::TotalTrades, Comparator::AtLeast, 200.0),
            ],
        }
    }
}

impl ConstraintSet {
    pub fn required_passes(&self) -> usize {
        self.min_passing
            .unwrap_or(self.constraints.len() / 2 + 1)
    }

    /// Pure and deterministic: same inputs, same verdict.
    pub fn evaluate(&self, metrics: &MetricSet) -> GateVerdict {
        let results: Vec<ConstraintResult> =
            self.constraints.iter().map(|c| c.evaluate(metrics)).collect();
        let passed_count = results.iter().filter(|r| r.passed).count();
        let required = self.required_passes();

        GateVerdict {
            results,
            passed_count,
            required,
            accepted: passed_count >= required,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.constraints.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "constraints".to_string(),
                reason: "at least one constraint is required".to_string(),
            });
        }
        let required = self.required_passes();
        if required == 0 || required > self.constraints.len() {
            return Err(ConfigError::InvalidValue {
                key: "min_passing".to_string(),
                reason: format!(
                    "must be between 1 and {} (got {})",
                    self.constraints.len(),
                    required
                ),
            });
        }
        if let Some(c) = self.constraints.iter().find(|c| !c.threshold.is_finite()) {
            return Err(ConfigError::InvalidValue {
                key: c.name.clone(),
                reason: "threshold must be finite".to_string(),
            });
        }
        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let set: ConstraintSet = toml::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "CONSTRAINTS_CONFIG".to_string(),
            reason: e.to_string(),
        })?;
        set.validate()?;
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            key: "CONSTRAINTS_CONFIG".to_string(),
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&raw)
    }
}
