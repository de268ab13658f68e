use statrs::statistics::Statistics;

/// Below this the return series is treated as zero-variance.
const MIN_STD_DEV: f64 = 1e-12;

/// Floor for the running peak when normalizing drawdowns.
pub const DRAWDOWN_EPSILON: f64 = 1e-10;

/// Shared statistics utilities for per-trade return series.
pub struct Stats;

impl Stats {
    pub fn mean(returns: &[f64]) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        returns.mean()
    }

    /// Population standard deviation (ddof = 0).
    pub fn std_dev(returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        returns.population_std_dev()
    }

    /// Sharpe ratio of per-trade returns scaled by `sqrt(annualization_periods)`.
    ///
    /// Returns 0.0 for zero-variance series.
    pub fn sharpe_ratio(returns: &[f64], annualization_periods: f64) -> f64 {
        let std_dev = Self::std_dev(returns);
        if std_dev <= MIN_STD_DEV || !std_dev.is_finite() {
            return 0.0;
        }
        Self::mean(returns) / std_dev * annualization_periods.max(0.0).sqrt()
    }

    /// Maximum peak-to-trough decline of the cumulative-sum return curve.
    ///
    /// The running peak is monotonic; each drawdown is normalized by
    /// `max(peak, DRAWDOWN_EPSILON)` and the result is clamped to `[0, 1]`.
    pub fn max_drawdown(returns: &[f64]) -> f64 {
        let mut cumulative = 0.0;
        let mut peak = f64::NEG_INFINITY;
        let mut max_drawdown: f64 = 0.0;

        for r in returns {
            cumulative += r;
            peak = peak.max(cumulative);
            let drawdown = (peak - cumulative) / peak.max(DRAWDOWN_EPSILON);
            max_drawdown = max_drawdown.max(drawdown);
        }

        max_drawdown.clamp(0.0, 1.0)
    }

    /// Longest runs of winning and losing trades, in that order.
    pub fn consecutive_streaks(returns: &[f64]) -> (usize, usize) {
        let mut max_wins = 0;
        let mut max_losses = 0;
        let mut wins = 0;
        let mut losses = 0;

        for r in returns {
            if *r > 0.0 {
                wins += 1;
                losses = 0;
            } else {
                losses += 1;
                wins = 0;
            }
            max_wins = max_wins.max(wins);
            max_losses = max_losses.max(losses);
        }

        (max_wins, max_losses)
    }
}
