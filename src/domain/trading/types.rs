use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Long,
    Short,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Long => write!(f, "LONG"),
            TradeSide::Short => write!(f, "SHORT"),
        }
    }
}

/// One closed position as reported by the verify stage.
///
/// `return_pct` is a signed fraction (0.02 = +2%). Records are never mutated
/// after they are read from the verify report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(alias = "entry_time")]
    pub entry_timestamp: DateTime<Utc>,
    #[serde(alias = "exit_time")]
    pub exit_timestamp: DateTime<Utc>,
    #[serde(alias = "pnl_pct")]
    pub return_pct: f64,
    #[serde(alias = "direction")]
    pub side: TradeSide,
}

impl TradeRecord {
    pub fn new(
        entry_timestamp: DateTime<Utc>,
        exit_timestamp: DateTime<Utc>,
        return_pct: f64,
        side: TradeSide,
    ) -> Self {
        Self {
            entry_timestamp,
            exit_timestamp,
            return_pct,
            side,
        }
    }

    pub fn is_win(&self) -> bool {
        self.return_pct > 0.0
    }

    /// Exit must not precede entry and the return must be a real number.
    pub fn is_well_formed(&self) -> bool {
        self.exit_timestamp >= self.entry_timestamp && self.return_pct.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_deserialize_backtest_field_names() {
        let json = r#"{
            "entry_time": "2025-01-06T10:00:00Z",
            "exit_time": "2025-01-06T14:00:00Z",
            "pnl_pct": -0.0125,
            "direction": "short"
        }"#;
        let trade: TradeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(trade.side, TradeSide::Short);
        assert_eq!(trade.return_pct, -0.0125);
        assert!(!trade.is_win());
        assert!(trade.is_well_formed());
    }

    #[test]
    fn test_exit_before_entry_is_malformed() {
        let entry = Utc.with_ymd_and_hms(2025, 1, 6, 14, 0, 0).unwrap();
        let exit = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        let trade = TradeRecord::new(entry, exit, 0.01, TradeSide::Long);
        assert!(!trade.is_well_formed());
    }
}
