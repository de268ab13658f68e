use crate::domain::optimization::parameter_set::ParameterSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// JSON body of the parameter update call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationPayload {
    pub parameters: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub score: f64,
}

impl From<&ParameterSet> for PropagationPayload {
    fn from(set: &ParameterSet) -> Self {
        Self {
            parameters: set.parameters.clone(),
            timestamp: set.timestamp,
            source: set.source.clone(),
            score: set.score,
        }
    }
}

/// Body of the trading service health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub bot_active: bool,
}
