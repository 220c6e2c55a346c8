//! Stability validator: full-period plus split-half re-test of a candidate.
//!
//! Opportunities are ordered chronologically and split at `n / 2`. The two
//! halves are compared for profit drift and win-rate decay; a losing second
//! half is treated as severe. The verdict gates what reaches production.

use serde::{Deserialize, Serialize};
use tracing::info;

use sigopt_core::domain::{sort_chronologically, Opportunity, ParameterSet};
use sigopt_core::{evaluate, IntrabarPolicy, SimulationResult};

use crate::config::ConfigError;

// ─── Configuration ───────────────────────────────────────────────────

/// Phase 4 thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Relative half-to-half profit change that counts as drift.
    pub profit_diff_threshold: f64,
    /// Second/first half win-rate ratio below which win rate is decaying.
    pub winrate_ratio_floor: f64,
    /// Overfitting score at which a candidate is OVERFITTED.
    pub overfit_score_limit: u32,
    /// Stability score needed to pass.
    pub pass_stability: f64,
    /// Stability score needed for a warning instead of UNSTABLE.
    pub warn_stability: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            profit_diff_threshold: 0.3,
            winrate_ratio_floor: 0.8,
            overfit_score_limit: 2,
            pass_stability: 70.0,
            warn_stability: 50.0,
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.profit_diff_threshold.is_finite() && self.profit_diff_threshold >= 0.0) {
            return Err(ConfigError::Invalid(
                "validator.profit_diff_threshold must be finite and >= 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.winrate_ratio_floor) {
            return Err(ConfigError::Invalid(
                "validator.winrate_ratio_floor must be within [0, 1]".into(),
            ));
        }
        if self.overfit_score_limit == 0 {
            return Err(ConfigError::Invalid(
                "validator.overfit_score_limit must be > 0".into(),
            ));
        }
        let ordered = (0.0..=100.0).contains(&self.warn_stability)
            && (0.0..=100.0).contains(&self.pass_stability)
            && self.warn_stability <= self.pass_stability;
        if !ordered {
            return Err(ConfigError::Invalid(format!(
                "validator stability thresholds must satisfy 0 <= warn ({}) <= pass ({}) <= 100",
                self.warn_stability, self.pass_stability
            )));
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Phase 4 verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Passed,
    Warning,
    Unstable,
    Overfitted,
    Failed,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Passed => "PASSED",
            Self::Warning => "WARNING",
            Self::Unstable => "UNSTABLE",
            Self::Overfitted => "OVERFITTED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Individual overfitting signals that contributed to the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverfitSignal {
    /// Half-to-half profit change above threshold (+1).
    ProfitDrift,
    /// Win rate decayed in the second half (+1).
    WinRateDecay,
    /// Second half lost money (+2).
    LosingSecondHalf,
}

impl OverfitSignal {
    pub fn weight(&self) -> u32 {
        match self {
            Self::ProfitDrift | Self::WinRateDecay => 1,
            Self::LosingSecondHalf => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub verdict: Verdict,
    pub full: SimulationResult,
    pub first_half: SimulationResult,
    pub second_half: SimulationResult,
    pub profit_diff_pct: f64,
    pub winrate_ratio: f64,
    pub overfitting_score: u32,
    pub signals: Vec<OverfitSignal>,
    pub stability_score: f64,
    /// Full-period avg profit minus the Phase 2 baseline's (diagnostic only).
    pub profit_change_vs_baseline: Option<f64>,
}

// ─── Metrics ─────────────────────────────────────────────────────────

/// |second - first| / |first|; a zero first half gives 0 when the second is
/// also zero and 1 otherwise.
pub fn profit_diff_pct(first: f64, second: f64) -> f64 {
    if first == 0.0 {
        if second == 0.0 {
            0.0
        } else {
            1.0
        }
    } else {
        (second - first).abs() / first.abs()
    }
}

/// second / first; a zero first-half win rate gives 1.
pub fn winrate_ratio(first: f64, second: f64) -> f64 {
    if first == 0.0 {
        1.0
    } else {
        second / first
    }
}

/// 100 minus proportional drift and decay penalties, clamped to [0, 100];
/// 0 when the second half lost money.
pub fn stability_score(profit_diff_pct: f64, winrate_ratio: f64, second_half_avg: f64) -> f64 {
    if second_half_avg < 0.0 {
        return 0.0;
    }
    let penalty = 100.0 * profit_diff_pct + 100.0 * (1.0 - winrate_ratio).max(0.0);
    (100.0 - penalty).clamp(0.0, 100.0)
}

// ─── Validator ───────────────────────────────────────────────────────

pub struct StabilityValidator {
    config: ValidatorConfig,
    policy: IntrabarPolicy,
}

impl StabilityValidator {
    pub fn new(config: &ValidatorConfig, policy: IntrabarPolicy) -> Self {
        Self {
            config: config.clone(),
            policy,
        }
    }

    fn decide(&self, full_avg: f64, overfitting_score: u32, stability: f64) -> Verdict {
        if full_avg <= 0.0 {
            Verdict::Failed
        } else if overfitting_score >= self.config.overfit_score_limit {
            Verdict::Overfitted
        } else if stability >= self.config.pass_stability {
            Verdict::Passed
        } else if stability >= self.config.warn_stability {
            Verdict::Warning
        } else {
            Verdict::Unstable
        }
    }

    /// Validate `params` over `opportunities`. `baseline_avg_profit` only
    /// feeds the diagnostic profit change.
    pub fn validate(
        &self,
        params: &ParameterSet,
        opportunities: &[Opportunity],
        baseline_avg_profit: Option<f64>,
    ) -> ValidationReport {
        let mut ordered = opportunities.to_vec();
        sort_chronologically(&mut ordered);
        let mid = ordered.len() / 2;
        let (early, late) = ordered.split_at(mid);

        let full = evaluate(&ordered, params, self.policy);
        let first_half = evaluate(early, params, self.policy);
        let second_half = evaluate(late, params, self.policy);

        let diff = profit_diff_pct(first_half.avg_profit, second_half.avg_profit);
        let ratio = winrate_ratio(first_half.win_rate, second_half.win_rate);

        let mut signals = Vec::new();
        if diff > self.config.profit_diff_threshold {
            signals.push(OverfitSignal::ProfitDrift);
        }
        if ratio < self.config.winrate_ratio_floor {
            signals.push(OverfitSignal::WinRateDecay);
        }
        if second_half.avg_profit < 0.0 {
            signals.push(OverfitSignal::LosingSecondHalf);
        }
        let overfitting_score: u32 = signals.iter().map(OverfitSignal::weight).sum();
        let stability = stability_score(diff, ratio, second_half.avg_profit);
        let verdict = self.decide(full.avg_profit, overfitting_score, stability);

        info!(
            %verdict,
            full_avg_profit = full.avg_profit,
            first_half_avg = first_half.avg_profit,
            second_half_avg = second_half.avg_profit,
            overfitting_score,
            stability_score = stability,
            "phase 4 validation"
        );

        ValidationReport {
            verdict,
            profit_change_vs_baseline: baseline_avg_profit.map(|b| full.avg_profit - b),
            full,
            first_half,
            second_half,
            profit_diff_pct: diff,
            winrate_ratio: ratio,
            overfitting_score,
            signals,
            stability_score: stability,
        }
    }
}
