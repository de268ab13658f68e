use super::stats::Stats;
use crate::domain::trading::types::TradeRecord;
use serde::{Deserialize, Serialize};

/// Sortino is approximated as a fixed multiple of Sharpe, not computed from
/// downside deviation. Kept for parity with the scores the optimizer was tuned
/// against; treat the value as a scaled Sharpe when comparing across systems.
pub const SORTINO_SHARPE_MULTIPLIER: f64 = 1.2;

/// Finite stand-in for the profit factor of a loss-free trade sequence.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Upper bound applied to the raw Kelly fraction (half-Kelly sizing).
pub const KELLY_CAP: f64 = 0.5;

/// Default number of periods used to annualize per-trade Sharpe.
pub const DEFAULT_ANNUALIZATION_PERIODS: f64 = 252.0;

/// Weights of the composite score.
#[derive(Debug, Clone, Copy)]
pub struct CompositeWeights {
    pub sortino: f64,
    pub calmar: f64,
    pub profit_factor: f64,
    pub sqn: f64,
    pub drawdown_penalty: f64,
}

pub const COMPOSITE_WEIGHTS: CompositeWeights = CompositeWeights {
    sortino: 0.35,
    calmar: 0.25,
    profit_factor: 0.20,
    sqn: 0.20,
    drawdown_penalty: 0.5,
};

impl CompositeWeights {
    /// Weighted linear combination. The inputs are not normalized to a common
    /// scale, so a large Calmar or SQN can dominate the score.
    pub fn score(
        &self,
        sortino: f64,
        calmar: f64,
        profit_factor: f64,
        sqn: f64,
        max_drawdown: f64,
    ) -> f64 {
        self.sortino * sortino + self.calmar * calmar + self.profit_factor * profit_factor
            + self.sqn * sqn
            - self.drawdown_penalty * max_drawdown
    }
}

/// Performance statistics of one verify-stage trade log.
///
/// Derived once from the trade records and never mutated afterwards. Every
/// ratio substitutes 0.0 for a zero denominator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSet {
    // Trade Statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // Profit Metrics
    pub total_return: f64,
    pub average_win: f64,
    /// Magnitude of the mean losing return (always >= 0).
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
    pub reward_risk_ratio: f64,
    pub expectancy: f64,

    // Risk-Adjusted Returns
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub sqn: f64,

    // Drawdown
    pub max_drawdown: f64,

    // Consecutive Trades
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    // Sizing
    pub kelly_fraction: f64,
    pub kelly_applied: f64,

    pub composite_score: f64,
}

impl MetricSet {
    /// Calculate metrics from a trade log using the default annualization.
    ///
    /// An empty log yields `None` ("no metrics available"), not an error.
    pub fn calculate(trades: &[TradeRecord]) -> Option<Self> {
        Self::calculate_with_annualization(trades, DEFAULT_ANNUALIZATION_PERIODS)
    }

    pub fn calculate_with_annualization(
        trades: &[TradeRecord],
        annualization_periods: f64,
    ) -> Option<Self> {
        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        Self::from_returns(&returns, annualization_periods)
    }

    /// Calculate metrics from signed per-trade returns expressed as fractions.
    pub fn from_returns(returns: &[f64], annualization_periods: f64) -> Option<Self> {
        if returns.is_empty() {
            return None;
        }

        let total_trades = returns.len();
        // Flat trades count against the win rate.
        let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|r| *r <= 0.0).collect();

        let win_rate = wins.len() as f64 / total_trades as f64;
        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().map(|r| r.abs()).sum();
        let total_return: f64 = returns.iter().sum();

        let average_win = Stats::mean(&wins);
        let average_loss = Stats::mean(&losses).abs();
        let largest_win = wins.iter().copied().fold(0.0, f64::max);
        let largest_loss = losses.iter().copied().fold(0.0, f64::min);

        let profit_factor = profit_factor(gross_profit, gross_loss);
        let reward_risk_ratio = if average_loss > 0.0 {
            average_win / average_loss
        } else {
            0.0
        };
        let expectancy = win_rate * average_win - (1.0 - win_rate) * average_loss;
        let kelly_fraction = kelly_fraction(win_rate, average_win, average_loss);

        let sharpe_ratio = Stats::sharpe_ratio(returns, annualization_periods);
        let sortino_ratio = sharpe_ratio * SORTINO_SHARPE_MULTIPLIER;
        let max_drawdown = Stats::max_drawdown(returns);
        let calmar_ratio = calmar_ratio(total_return, max_drawdown);
        let sqn = sharpe_ratio * (total_trades as f64).sqrt();

        let (max_consecutive_wins, max_consecutive_losses) = Stats::consecutive_streaks(returns);

        let composite_score = COMPOSITE_WEIGHTS.score(
            sortino_ratio,
            calmar_ratio,
            profit_factor,
            sqn,
            max_drawdown,
        );

        Some(Self {
            total_trades,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            total_return,
            average_win,
            average_loss,
            largest_win,
            largest_loss,
            profit_factor,
            reward_risk_ratio,
            expectancy,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            sqn,
            max_drawdown,
            max_consecutive_wins,
            max_consecutive_losses,
            kelly_fraction,
            kelly_applied: kelly_fraction.min(KELLY_CAP),
            composite_score,
        })
    }

    /// Build a metric set from the summary a verify stage reported instead of
    /// a trade log. Calmar, SQN and the composite score are recomputed from
    /// the reported values so they follow the same formulas as `calculate`.
    pub fn from_basic_metrics(basic: &BasicMetrics) -> Option<Self> {
        if basic.total_trades == 0 {
            return None;
        }

        let profit_factor = if basic.profit_factor.is_finite() {
            basic.profit_factor.max(0.0)
        } else {
            PROFIT_FACTOR_CAP
        };
        let max_drawdown = finite_or_zero(basic.max_drawdown).clamp(0.0, 1.0);
        let sharpe_ratio = finite_or_zero(basic.sharpe_ratio);
        let sortino_ratio = finite_or_zero(basic.sortino_ratio);
        let total_return = finite_or_zero(basic.total_return);
        let win_rate = finite_or_zero(basic.win_rate).clamp(0.0, 1.0);
        let average_win = finite_or_zero(basic.avg_win.unwrap_or(0.0));
        let average_loss = finite_or_zero(basic.avg_loss.unwrap_or(0.0)).abs();

        let calmar_ratio = calmar_ratio(total_return, max_drawdown);
        let sqn = sharpe_ratio * (basic.total_trades as f64).sqrt();
        let kelly_fraction = kelly_fraction(win_rate, average_win, average_loss);
        let winning_trades = (win_rate * basic.total_trades as f64).round() as usize;

        Some(Self {
            total_trades: basic.total_trades,
            winning_trades,
            losing_trades: basic.total_trades.saturating_sub(winning_trades),
            win_rate,
            total_return,
            average_win,
            average_loss,
            profit_factor,
            reward_risk_ratio: if average_loss > 0.0 {
                average_win / average_loss
            } else {
                0.0
            },
            expectancy: win_rate * average_win - (1.0 - win_rate) * average_loss,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            sqn,
            max_drawdown,
            kelly_fraction,
            kelly_applied: kelly_fraction.min(KELLY_CAP),
            composite_score: COMPOSITE_WEIGHTS.score(
                sortino_ratio,
                calmar_ratio,
                profit_factor,
                sqn,
                max_drawdown,
            ),
            ..Self::default()
        })
    }

    /// Human-readable summary used in run notifications.
    pub fn summary(&self) -> String {
        format!(
            "• Total trades: {}\n• Win rate: {:.1}%\n• Profit factor: {:.2}\n• Total return: {:.1}%\n• Max drawdown: {:.1}%\n• Sharpe: {:.2}\n• Sortino: {:.2}\n• Composite score: {:.4}",
            self.total_trades,
            self.win_rate * 100.0,
            self.profit_factor,
            self.total_return * 100.0,
            self.max_drawdown * 100.0,
            self.sharpe_ratio,
            self.sortino_ratio,
            self.composite_score,
        )
    }
}

/// `basic_metrics` section of a verify report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicMetrics {
    pub total_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    #[serde(default)]
    pub avg_win: Option<f64>,
    #[serde(default)]
    pub avg_loss: Option<f64>,
}

fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        0.0
    }
}

fn calmar_ratio(total_return: f64, max_drawdown: f64) -> f64 {
    if max_drawdown > 0.0 {
        total_return / max_drawdown
    } else {
        0.0
    }
}

/// `max(0, p - (1 - p) / b)` with `b = average_win / average_loss`.
fn kelly_fraction(win_rate: f64, average_win: f64, average_loss: f64) -> f64 {
    if average_win <= 0.0 || average_loss <= 0.0 {
        return 0.0;
    }
    let b = average_win / average_loss;
    (win_rate - (1.0 - win_rate) / b).max(0.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
