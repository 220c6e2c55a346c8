//! Candidate scoring for exploration and refinement.

use serde::{Deserialize, Serialize};

use sigopt_core::SimulationResult;

/// Blend weights of the exploration score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreWeights {
    /// Weight of `1 - time_exit_rate`.
    pub time_exit_avoidance: f64,
    /// Weight of `capture_rate`.
    pub capture: f64,
    /// Weight of the normalized average profit.
    pub profit: f64,
}

impl ScoreWeights {
    /// Scalping punishes trades that stall until the time exit.
    pub fn scalping() -> Self {
        Self {
            time_exit_avoidance: 0.5,
            capture: 0.2,
            profit: 0.3,
        }
    }

    /// Swing favors profit.
    pub fn swing() -> Self {
        Self {
            time_exit_avoidance: 0.2,
            capture: 0.3,
            profit: 0.5,
        }
    }

    pub fn is_valid(&self) -> bool {
        let all = [self.time_exit_avoidance, self.capture, self.profit];
        all.iter().all(|w| w.is_finite() && *w >= 0.0) && all.iter().sum::<f64>() > 0.0
    }
}

/// Map an average profit (percent) into [-1, 1] using a per-type scale.
pub fn normalize_profit(avg_profit: f64, profit_scale_pct: f64) -> f64 {
    if profit_scale_pct <= 0.0 || !avg_profit.is_finite() {
        return 0.0;
    }
    (avg_profit / profit_scale_pct).clamp(-1.0, 1.0)
}

/// Exploration score. A parameter set that trades nothing scores 0.
pub fn explorer_score(result: &SimulationResult, weights: &ScoreWeights, profit_scale_pct: f64) -> f64 {
    if result.captured_count == 0 {
        return 0.0;
    }
    weights.time_exit_avoidance * (1.0 - result.time_exit_rate())
        + weights.capture * result.capture_rate()
        + weights.profit * normalize_profit(result.avg_profit, profit_scale_pct)
}

/// Refinement score: normalized profit blended with trade quality
/// (`win_rate * profit_ratio`).
pub fn refiner_score(
    result: &SimulationResult,
    profit_scale_pct: f64,
    profit_weight: f64,
    quality_weight: f64,
) -> f64 {
    profit_weight * normalize_profit(result.avg_profit, profit_scale_pct)
        + quality_weight * result.win_rate * result.profit_ratio
}

/// Filter-matrix score: total profit (percent points) blended with the
/// capture rate expressed in percent.
pub fn filter_matrix_score(result: &SimulationResult, profit_weight: f64, capture_weight: f64) -> f64 {
    profit_weight * result.total_profit + capture_weight * result.capture_rate() * 100.0
}
