use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source label of the built-in fallback parameters.
pub const DEFAULT_SOURCE: &str = "default";

/// Strategy parameters plus the provenance that justified them.
///
/// Created by the optimize stage, persisted only after the constraint gate
/// accepts it, then pushed to the trading service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub parameters: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub score: f64,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

impl ParameterSet {
    pub fn new(parameters: BTreeMap<String, f64>, source: &str, score: f64) -> Self {
        Self {
            parameters,
            timestamp: Utc::now(),
            source: source.to_string(),
            score,
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    pub fn is_default(&self) -> bool {
        self.source == DEFAULT_SOURCE
    }

    /// Returns the names of parameters that are not finite numbers.
    pub fn non_finite(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|(_, v)| !v.is_finite())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Copy of this set relabelled for propagation.
    pub fn with_provenance(&self, source: &str, score: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            parameters: self.parameters.clone(),
            timestamp,
            source: source.to_string(),
            score,
        }
    }
}

impl Default for ParameterSet {
    /// Baseline parameters used until the first accepted optimization.
    fn default() -> Self {
        let parameters = [
            ("target_r", 2.0882),
            ("stop_atr_mult", 0.0536),
            ("swing_len", 3.3045),
            ("rr_percentile", 0.1104),
            ("atr_len", 11.5239),
            ("session_strength", 1.0787),
            ("volume_filter", 1.0611),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            parameters,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            source: default_source(),
            score: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let params = ParameterSet::default();
        assert!(params.is_default());
        assert_eq!(params.get("target_r"), Some(2.0882));
        assert_eq!(params.get("unknown"), None);
        assert!(params.non_finite().is_empty());
    }

    #[test]
    fn test_deserialize_without_source() {
        let json = r#"{
            "parameters": {"target_r": 2.5, "swing_len": 4.0},
            "timestamp": "2025-06-01T03:12:44Z",
            "score": 3.71
        }"#;
        let params: ParameterSet = serde_json::from_str(json).unwrap();
        assert_eq!(params.source, DEFAULT_SOURCE);
        assert_eq!(params.score, 3.71);
        assert_eq!(params.parameters.len(), 2);
    }
}
