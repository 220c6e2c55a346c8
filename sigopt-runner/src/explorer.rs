//! Fast explorer: coarse grid search producing the baseline parameter set.
//!
//! Every grid combination is replayed over the full opportunity set of one
//! signal type and scored with [`explorer_score`]. Evaluations are pure, so
//! they run on the rayon pool when parallelism is enabled; the winner and the
//! recorded candidates are identical either way.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use sigopt_core::domain::{Opportunity, ParamError, ParameterSet, SignalType};
use sigopt_core::{evaluate, IntrabarPolicy, SimulationResult};

use crate::grid::{GridBounds, ParamGrid, SAMPLE_FACTORS};
use crate::scoring::{explorer_score, ScoreWeights};

// ─── Configuration ───────────────────────────────────────────────────

/// Per-signal-type search profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExplorerProfile {
    pub weights: ScoreWeights,
    /// Average profit (percent) that maps to a full profit score.
    pub profit_scale_pct: f64,
    pub bounds: GridBounds,
    /// Grid centre used when no accepted parameter set exists yet.
    pub center: ParameterSet,
    pub signal_score_floors: Vec<f64>,
}

impl ExplorerProfile {
    pub fn scalping() -> Self {
        Self {
            weights: ScoreWeights::scalping(),
            profit_scale_pct: 2.0,
            bounds: GridBounds::scalping(),
            center: ParameterSet::SCALPING_CENTER,
            signal_score_floors: vec![55.0, 65.0],
        }
    }

    pub fn swing() -> Self {
        Self {
            weights: ScoreWeights::swing(),
            profit_scale_pct: 5.0,
            bounds: GridBounds::swing(),
            center: ParameterSet::SWING_CENTER,
            signal_score_floors: vec![60.0, 70.0],
        }
    }

    /// Largest grid this profile can produce.
    pub fn max_grid_size(&self) -> usize {
        SAMPLE_FACTORS.len().pow(3) * self.signal_score_floors.len()
    }
}

/// Phase 2 configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorerConfig {
    pub max_combinations: usize,
    /// Evaluate grid combinations on the rayon pool.
    pub parallel: bool,
    pub scalping: ExplorerProfile,
    pub swing: ExplorerProfile,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_combinations: 60,
            parallel: true,
            scalping: ExplorerProfile::scalping(),
            swing: ExplorerProfile::swing(),
        }
    }
}

impl ExplorerConfig {
    pub fn profile(&self, signal_type: SignalType) -> &ExplorerProfile {
        match signal_type {
            SignalType::Scalping => &self.scalping,
            SignalType::Swing => &self.swing,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors from exploration and refinement.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("no {0} opportunities to optimize against")]
    EmptyOpportunitySet(SignalType),
    #[error("grid has {size} combinations, limit is {limit}")]
    GridTooLarge { size: usize, limit: usize },
    #[error("grid parameter error: {0}")]
    Param(#[from] ParamError),
}

// ─── Result types ────────────────────────────────────────────────────

/// One evaluated parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub label: String,
    pub params: ParameterSet,
    pub result: SimulationResult,
    pub score: f64,
}

/// Phase 2 output: the baseline plus every evaluated combination in grid order.
#[derive(Debug, Clone)]
pub struct ExplorerOutcome {
    pub best: ScoredCandidate,
    pub evaluated: Vec<ScoredCandidate>,
}

impl ExplorerOutcome {
    /// Evaluated combinations from best to worst. The first entry is `best`.
    pub fn ranked(&self) -> Vec<&ScoredCandidate> {
        let mut ranked: Vec<&ScoredCandidate> = self.evaluated.iter().collect();
        ranked.sort_by(|a, b| rank_order(a, b));
        ranked
    }

    /// The `k` best combinations after `best`, as Phase 3 search starts.
    pub fn runners_up(&self, k: usize) -> Vec<ParameterSet> {
        self.ranked()
            .into_iter()
            .skip(1)
            .take(k)
            .map(|c| c.params)
            .collect()
    }
}

/// Higher score, then higher capture rate, then a less aggressive
/// take-profit. Full ties compare equal so a stable sort keeps grid order.
fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            b.result
                .capture_rate()
                .total_cmp(&a.result.capture_rate())
        })
        .then_with(|| {
            a.params
                .atr_tp_multiplier()
                .total_cmp(&b.params.atr_tp_multiplier())
        })
}

/// Challenger strictly outranks the incumbent. Full ties keep the incumbent
/// (earlier grid order).
fn beats(challenger: &ScoredCandidate, incumbent: &ScoredCandidate) -> bool {
    rank_order(challenger, incumbent) == Ordering::Less
}

// ─── Explorer ────────────────────────────────────────────────────────

/// Grid-search executor for one signal type.
pub struct FastExplorer {
    signal_type: SignalType,
    profile: ExplorerProfile,
    max_combinations: usize,
    policy: IntrabarPolicy,
    parallel: bool,
}

impl FastExplorer {
    pub fn new(config: &ExplorerConfig, signal_type: SignalType, policy: IntrabarPolicy) -> Self {
        Self {
            signal_type,
            profile: config.profile(signal_type).clone(),
            max_combinations: config.max_combinations,
            policy,
            parallel: config.parallel,
        }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Grid centred on `center`, or on the profile's default centre.
    pub fn grid(&self, center: Option<&ParameterSet>) -> Result<Vec<ParameterSet>, OptimizeError> {
        let center = center.unwrap_or(&self.profile.center);
        let grid = ParamGrid::around(center, &self.profile.bounds, &self.profile.signal_score_floors);
        let size = grid.size();
        if size > self.max_combinations {
            return Err(OptimizeError::GridTooLarge {
                size,
                limit: self.max_combinations,
            });
        }
        Ok(grid.generate()?)
    }

    fn score(&self, label: String, params: ParameterSet, opportunities: &[Opportunity]) -> ScoredCandidate {
        let result = evaluate(opportunities, &params, self.policy);
        let score = explorer_score(&result, &self.profile.weights, self.profile.profit_scale_pct);
        ScoredCandidate {
            label,
            params,
            result,
            score,
        }
    }

    /// Search the grid around `center`.
    pub fn explore(
        &self,
        opportunities: &[Opportunity],
        center: Option<&ParameterSet>,
    ) -> Result<ExplorerOutcome, OptimizeError> {
        let grid = self.grid(center)?;
        self.explore_grid(opportunities, &grid)
    }

    /// Search an explicit grid.
    pub fn explore_grid(
        &self,
        opportunities: &[Opportunity],
        grid: &[ParameterSet],
    ) -> Result<ExplorerOutcome, OptimizeError> {
        if opportunities.is_empty() {
            return Err(OptimizeError::EmptyOpportunitySet(self.signal_type));
        }
        if grid.len() > self.max_combinations {
            return Err(OptimizeError::GridTooLarge {
                size: grid.len(),
                limit: self.max_combinations,
            });
        }

        let evaluated: Vec<ScoredCandidate> = if self.parallel {
            grid.par_iter()
                .enumerate()
                .map(|(i, params)| self.score(format!("grid[{i}]"), *params, opportunities))
                .collect()
        } else {
            grid.iter()
                .enumerate()
                .map(|(i, params)| self.score(format!("grid[{i}]"), *params, opportunities))
                .collect()
        };

        let mut best_idx = None;
        for (i, candidate) in evaluated.iter().enumerate() {
            debug!(
                signal_type = %self.signal_type,
                label = %candidate.label,
                score = candidate.score,
                capture_rate = candidate.result.capture_rate(),
                "grid candidate"
            );
            best_idx = match best_idx {
                Some(b) if !beats(candidate, &evaluated[b]) => Some(b),
                _ => Some(i),
            };
        }
        let best = best_idx
            .and_then(|i| evaluated.get(i).cloned())
            .ok_or(OptimizeError::EmptyOpportunitySet(self.signal_type))?;

        info!(
            signal_type = %self.signal_type,
            combinations = evaluated.len(),
            opportunities = opportunities.len(),
            best = %best.label,
            score = best.score,
            capture_rate = best.result.capture_rate(),
            avg_profit = best.result.avg_profit,
            "phase 2 exploration complete"
        );
        Ok(ExplorerOutcome { best, evaluated })
    }
}
