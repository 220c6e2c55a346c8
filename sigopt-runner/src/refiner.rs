//! Risk-controlled refiner: fuses externally suggested deltas into the
//! Phase 2 baseline without giving up capture rate.
//!
//! Candidate pool:
//! - per suggestion: the raw suggestion, the baseline blended with it, and
//!   seeded perturbations of the blend
//! - the next best Phase 2 grid points
//! - a multi-start local search: one-step moves of the take-profit and stop
//!   multipliers around the baseline, every valid suggestion and every grid
//!   runner-up
//! - the best cell of the consensus x signal-score filter matrix
//!
//! Any candidate whose capture rate falls below
//! `capture_floor_ratio x baseline` is disqualified.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sigopt_core::domain::{merge, Opportunity, ParamError, ParameterDelta, ParameterSet, SignalType};
use sigopt_core::rng::RngHierarchy;
use sigopt_core::{evaluate, IntrabarPolicy, SimulationResult};

use crate::config::ConfigError;
use crate::explorer::{OptimizeError, ScoredCandidate};
use crate::scoring::{filter_matrix_score, refiner_score};

/// Phase 3 configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefinerConfig {
    /// Minimum capture rate relative to the baseline.
    pub capture_floor_ratio: f64,
    /// Weight of the suggestion when blending it into the baseline.
    pub blend_weight: f64,
    /// Local perturbations of each blend.
    pub perturbations: usize,
    /// Relative jitter of perturbed multipliers.
    pub jitter: f64,
    pub seed: u64,
    pub profit_weight: f64,
    pub quality_weight: f64,
    /// Phase 2 runner-ups used as extra search starts.
    pub grid_starts: usize,
    /// Relative step of a local-search move.
    pub local_step: f64,
    /// Entry-filter variants tried on the baseline.
    pub filter_matrix: Vec<FilterCell>,
    pub matrix_profit_weight: f64,
    pub matrix_capture_weight: f64,
    pub parallel: bool,
}

/// One entry-filter variant: the baseline with these two thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterCell {
    pub min_indicator_consensus: u32,
    pub min_signal_score: f64,
}

impl FilterCell {
    pub const fn new(min_indicator_consensus: u32, min_signal_score: f64) -> Self {
        Self {
            min_indicator_consensus,
            min_signal_score,
        }
    }
}

/// Loosest recall first, then balanced, strict and single-axis variants.
pub const DEFAULT_FILTER_MATRIX: [FilterCell; 9] = [
    FilterCell::new(1, 75.0),
    FilterCell::new(1, 80.0),
    FilterCell::new(2, 80.0),
    FilterCell::new(2, 85.0),
    FilterCell::new(2, 90.0),
    FilterCell::new(3, 85.0),
    FilterCell::new(3, 90.0),
    FilterCell::new(1, 90.0),
    FilterCell::new(3, 80.0),
];

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            capture_floor_ratio: 0.9,
            blend_weight: 0.5,
            perturbations: 2,
            jitter: 0.1,
            seed: 42,
            profit_weight: 0.6,
            quality_weight: 0.4,
            grid_starts: 3,
            local_step: 0.1,
            filter_matrix: DEFAULT_FILTER_MATRIX.to_vec(),
            matrix_profit_weight: 0.7,
            matrix_capture_weight: 0.3,
            parallel: true,
        }
    }
}

impl RefinerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        if !unit(self.capture_floor_ratio) {
            return Err(ConfigError::Invalid(format!(
                "refiner.capture_floor_ratio must be within [0, 1], got {}",
                self.capture_floor_ratio
            )));
        }
        if !unit(self.blend_weight) {
            return Err(ConfigError::Invalid(format!(
                "refiner.blend_weight must be within [0, 1], got {}",
                self.blend_weight
            )));
        }
        if !(1..=2).contains(&self.perturbations) {
            return Err(ConfigError::Invalid(format!(
                "refiner.perturbations must be 1 or 2, got {}",
                self.perturbations
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "refiner.jitter must be within [0, 1), got {}",
                self.jitter
            )));
        }
        let weights_ok = [
            self.profit_weight,
            self.quality_weight,
            self.matrix_profit_weight,
            self.matrix_capture_weight,
        ]
        .iter()
        .all(|w| w.is_finite() && *w >= 0.0);
        if !weights_ok {
            return Err(ConfigError::Invalid(
                "refiner score weights must be finite and >= 0".into(),
            ));
        }
        if self.grid_starts > 5 {
            return Err(ConfigError::Invalid(format!(
                "refiner.grid_starts must be at most 5, got {}",
                self.grid_starts
            )));
        }
        if !(self.local_step > 0.0 && self.local_step <= 0.5) {
            return Err(ConfigError::Invalid(format!(
                "refiner.local_step must be within (0, 0.5], got {}",
                self.local_step
            )));
        }
        for (i, cell) in self.filter_matrix.iter().enumerate() {
            if !(cell.min_signal_score.is_finite() && cell.min_signal_score >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "refiner.filter_matrix[{i}].min_signal_score must be finite and >= 0, got {}",
                    cell.min_signal_score
                )));
            }
        }
        Ok(())
    }
}

/// Where a local search started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStart {
    Baseline,
    Suggestion { index: usize },
    RunnerUp { rank: usize },
}

impl SearchStart {
    fn label(&self) -> String {
        match self {
            Self::Baseline => "baseline".to_string(),
            Self::Suggestion { index } => format!("suggestion{index}"),
            Self::RunnerUp { rank } => format!("runner_up{rank}"),
        }
    }
}

/// Where a Phase 3 candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateOrigin {
    Baseline,
    Suggestion { index: usize },
    Merged { index: usize },
    Perturbed { index: usize, perturbation: usize },
    /// Phase 2 grid point ranked just behind the baseline (rank 1 is second).
    RunnerUp { rank: usize },
    LocalSearch { start: SearchStart, step: usize },
    FilterMatrix { cell: usize },
}

impl CandidateOrigin {
    pub fn label(&self) -> String {
        match self {
            Self::Baseline => "baseline".to_string(),
            Self::Suggestion { index } => format!("suggestion[{index}]"),
            Self::Merged { index } => format!("merged[{index}]"),
            Self::Perturbed {
                index,
                perturbation,
            } => format!("perturbed[{index}.{perturbation}]"),
            Self::RunnerUp { rank } => format!("runner_up[{rank}]"),
            Self::LocalSearch { start, step } => format!("local[{}.{step}]", start.label()),
            Self::FilterMatrix { cell } => format!("filter[{cell}]"),
        }
    }
}

/// Local-search moves: (take-profit factor sign, stop factor sign).
const LOCAL_MOVES: [(f64, f64); 4] = [(1.0, 0.0), (-1.0, 0.0), (0.0, 1.0), (0.0, -1.0)];

/// One evaluated filter-matrix cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCellResult {
    pub cell: usize,
    pub params: ParameterSet,
    pub result: SimulationResult,
    /// Filter-matrix score, not comparable with the refiner score.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedCandidate {
    pub origin: CandidateOrigin,
    pub params: ParameterSet,
    pub result: SimulationResult,
    pub score: f64,
    /// Below the capture-rate floor.
    pub rejected: bool,
}

/// Phase 3 output.
#[derive(Debug, Clone)]
pub struct RefinerOutcome {
    pub winner: RefinedCandidate,
    /// Every evaluated candidate, baseline first.
    pub evaluated: Vec<RefinedCandidate>,
    pub capture_floor: f64,
    /// Every filter-matrix cell in configuration order.
    pub filter_matrix: Vec<FilterCellResult>,
}

impl RefinerOutcome {
    /// True when an externally derived candidate displaced the baseline.
    pub fn improved(&self) -> bool {
        self.winner.origin != CandidateOrigin::Baseline
    }
}

/// Phase 3 executor for one signal type.
pub struct RiskControlledRefiner {
    signal_type: SignalType,
    config: RefinerConfig,
    profit_scale_pct: f64,
    policy: IntrabarPolicy,
    rng: RngHierarchy,
    holding_limit: Option<u32>,
}

impl RiskControlledRefiner {
    pub fn new(
        config: &RefinerConfig,
        signal_type: SignalType,
        profit_scale_pct: f64,
        policy: IntrabarPolicy,
    ) -> Self {
        Self {
            signal_type,
            config: config.clone(),
            profit_scale_pct,
            policy,
            rng: RngHierarchy::new(config.seed),
            holding_limit: None,
        }
    }

    /// Drop candidates that hold longer than the replayable forward path.
    pub fn with_holding_limit(mut self, max_holding_periods: u32) -> Self {
        self.holding_limit = Some(max_holding_periods);
        self
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    fn perturb(
        &self,
        merged: &ParameterSet,
        index: usize,
        perturbation: usize,
    ) -> Result<ParameterSet, ParamError> {
        let mut rng = self
            .rng
            .rng_for(self.signal_type, index as u64, perturbation as u64);
        let lo = 1.0 - self.config.jitter;
        let hi = 1.0 + self.config.jitter;
        let tp_factor = rng.gen_range(lo..=hi);
        let stop_factor = rng.gen_range(lo..=hi);
        let mut rec = merged.record();
        rec.atr_tp_multiplier *= tp_factor;
        rec.atr_stop_multiplier *= stop_factor;
        ParameterSet::new(rec)
    }

    fn local_move(&self, start: &ParameterSet, step: usize) -> Result<ParameterSet, ParamError> {
        let (tp_sign, stop_sign) = LOCAL_MOVES[step];
        let mut rec = start.record();
        rec.atr_tp_multiplier *= 1.0 + tp_sign * self.config.local_step;
        rec.atr_stop_multiplier *= 1.0 + stop_sign * self.config.local_step;
        ParameterSet::new(rec)
    }

    /// Candidate pool, baseline first. Invalid candidates are dropped.
    ///
    /// `runners_up` are the Phase 2 grid points ranked behind the baseline,
    /// best first; at most `grid_starts` of them are used.
    pub fn candidates(
        &self,
        baseline: &ParameterSet,
        suggestions: &[ParameterDelta],
        runners_up: &[ParameterSet],
    ) -> Vec<(CandidateOrigin, ParameterSet)> {
        let mut pool = vec![(CandidateOrigin::Baseline, *baseline)];
        let mut push = |origin: CandidateOrigin, candidate: Result<ParameterSet, ParamError>| {
            match candidate {
                Ok(params) if self.holding_limit.is_some_and(|limit| params.max_holding_periods() > limit) => {
                    warn!(
                        signal_type = %self.signal_type,
                        candidate = %origin.label(),
                        max_holding_periods = params.max_holding_periods(),
                        "dropping candidate that outlasts the forward path"
                    );
                    None
                }
                Ok(params) => {
                    pool.push((origin, params));
                    Some(params)
                }
                Err(err) => {
                    warn!(
                        signal_type = %self.signal_type,
                        candidate = %origin.label(),
                        error = %err,
                        "dropping invalid candidate"
                    );
                    None
                }
            }
        };

        let mut starts = vec![(SearchStart::Baseline, *baseline)];
        for (index, delta) in suggestions.iter().enumerate() {
            if let Some(raw) = push(CandidateOrigin::Suggestion { index }, merge(baseline, delta, 1.0)) {
                starts.push((SearchStart::Suggestion { index }, raw));
            }
            let merged = push(
                CandidateOrigin::Merged { index },
                merge(baseline, delta, self.config.blend_weight),
            );
            if let Some(merged) = merged {
                for perturbation in 0..self.config.perturbations {
                    push(
                        CandidateOrigin::Perturbed {
                            index,
                            perturbation,
                        },
                        self.perturb(&merged, index, perturbation),
                    );
                }
            }
        }

        for (i, params) in runners_up.iter().take(self.config.grid_starts).enumerate() {
            let rank = i + 1;
            push(CandidateOrigin::RunnerUp { rank }, Ok(*params));
            starts.push((SearchStart::RunnerUp { rank }, *params));
        }

        for (start, params) in &starts {
            for step in 0..LOCAL_MOVES.len() {
                push(
                    CandidateOrigin::LocalSearch {
                        start: *start,
                        step,
                    },
                    self.local_move(params, step),
                );
            }
        }
        pool
    }

    fn score(&self, result: &SimulationResult) -> f64 {
        refiner_score(
            result,
            self.profit_scale_pct,
            self.config.profit_weight,
            self.config.quality_weight,
        )
    }

    /// Replay the baseline under every configured entry-filter cell.
    pub fn filter_matrix(
        &self,
        baseline: &ParameterSet,
        opportunities: &[Opportunity],
    ) -> Vec<FilterCellResult> {
        let variants: Vec<(usize, ParameterSet)> = self
            .config
            .filter_matrix
            .iter()
            .enumerate()
            .filter_map(|(cell, filter)| {
                let mut rec = baseline.record();
                rec.min_indicator_consensus = filter.min_indicator_consensus;
                rec.min_signal_score = filter.min_signal_score;
                match ParameterSet::new(rec) {
                    Ok(params) => Some((cell, params)),
                    Err(err) => {
                        warn!(signal_type = %self.signal_type, cell, error = %err, "dropping filter cell");
                        None
                    }
                }
            })
            .collect();

        let build = |(cell, params): &(usize, ParameterSet)| {
            let result = evaluate(opportunities, params, self.policy);
            FilterCellResult {
                cell: *cell,
                params: *params,
                score: filter_matrix_score(
                    &result,
                    self.config.matrix_profit_weight,
                    self.config.matrix_capture_weight,
                ),
                result,
            }
        };
        if self.config.parallel {
            variants.par_iter().map(build).collect()
        } else {
            variants.iter().map(build).collect()
        }
    }

    /// Refine the Phase 2 baseline with the given suggestions and grid
    /// runner-ups.
    pub fn refine(
        &self,
        baseline: &ScoredCandidate,
        suggestions: &[ParameterDelta],
        runners_up: &[ParameterSet],
        opportunities: &[Opportunity],
    ) -> Result<RefinerOutcome, OptimizeError> {
        if opportunities.is_empty() {
            return Err(OptimizeError::EmptyOpportunitySet(self.signal_type));
        }
        let capture_floor = self.config.capture_floor_ratio * baseline.result.capture_rate();
        let mut pool = self.candidates(&baseline.params, suggestions, runners_up);

        let filter_matrix = self.filter_matrix(&baseline.params, opportunities);
        let mut best_cell: Option<&FilterCellResult> = None;
        for cell in filter_matrix.iter().filter(|c| c.result.captured_count > 0) {
            best_cell = match best_cell {
                Some(b) if cell.score <= b.score => Some(b),
                _ => Some(cell),
            };
        }
        if let Some(cell) = best_cell {
            pool.push((CandidateOrigin::FilterMatrix { cell: cell.cell }, cell.params));
        }

        let build = |(origin, params): &(CandidateOrigin, ParameterSet)| {
            let result = if *origin == CandidateOrigin::Baseline {
                baseline.result.clone()
            } else {
                evaluate(opportunities, params, self.policy)
            };
            RefinedCandidate {
                origin: *origin,
                params: *params,
                score: self.score(&result),
                rejected: result.capture_rate() < capture_floor,
                result,
            }
        };
        let evaluated: Vec<RefinedCandidate> = if self.config.parallel {
            pool.par_iter().map(build).collect()
        } else {
            pool.iter().map(build).collect()
        };

        let mut winner: Option<&RefinedCandidate> = None;
        for candidate in evaluated.iter().filter(|c| !c.rejected) {
            winner = match winner {
                Some(w) if candidate.score <= w.score => Some(w),
                _ => Some(candidate),
            };
        }
        // the baseline always clears its own floor
        let winner = winner
            .or_else(|| evaluated.first())
            .cloned()
            .ok_or(OptimizeError::EmptyOpportunitySet(self.signal_type))?;

        let rejected = evaluated.iter().filter(|c| c.rejected).count();
        info!(
            signal_type = %self.signal_type,
            candidates = evaluated.len(),
            rejected,
            capture_floor,
            filter_cells = filter_matrix.len(),
            winner = %winner.origin.label(),
            score = winner.score,
            "phase 3 refinement complete"
        );
        Ok(RefinerOutcome {
            winner,
            evaluated,
            capture_floor,
            filter_matrix,
        })
    }
}
