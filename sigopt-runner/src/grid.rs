//! Parameter grid centred on the current parameter set.
//!
//! Three samples per swept axis (`0.5x`, `1x`, `1.5x` the centre), clamped to
//! absolute bounds, rounded and de-duplicated, times the signal-score floors.

use serde::{Deserialize, Serialize};

use sigopt_core::domain::{ParamError, ParameterSet, ParameterSetRecord};

/// Multipliers applied to the centre of each swept axis.
pub const SAMPLE_FACTORS: [f64; 3] = [0.5, 1.0, 1.5];

/// Absolute bounds of the swept axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridBounds {
    pub tp_min: f64,
    pub tp_max: f64,
    pub stop_min: f64,
    pub stop_max: f64,
    pub holding_min: u32,
    pub holding_max: u32,
}

impl GridBounds {
    pub fn scalping() -> Self {
        Self {
            tp_min: 0.8,
            tp_max: 4.0,
            stop_min: 0.8,
            stop_max: 2.5,
            holding_min: 2,
            holding_max: 24,
        }
    }

    pub fn swing() -> Self {
        Self {
            tp_min: 1.5,
            tp_max: 7.0,
            stop_min: 0.8,
            stop_max: 3.0,
            holding_min: 24,
            holding_max: 96,
        }
    }

    pub fn is_valid(&self) -> bool {
        let finite = [self.tp_min, self.tp_max, self.stop_min, self.stop_max]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.tp_min > 0.0
            && self.tp_min <= self.tp_max
            && self.stop_min > 0.0
            && self.stop_min <= self.stop_max
            && self.holding_min > 0
            && self.holding_min <= self.holding_max
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn sample_f64(center: f64, min: f64, max: f64) -> Vec<f64> {
    let mut values: Vec<f64> = SAMPLE_FACTORS
        .iter()
        .map(|f| round2((center * f).clamp(min, max)))
        .collect();
    values.dedup();
    values
}

fn sample_u32(center: u32, min: u32, max: u32) -> Vec<u32> {
    let mut values: Vec<u32> = SAMPLE_FACTORS
        .iter()
        .map(|f| (f64::from(center) * f).round().clamp(f64::from(min), f64::from(max)) as u32)
        .collect();
    values.dedup();
    values
}

/// Discrete grid of parameter sets.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub tp_multipliers: Vec<f64>,
    pub stop_multipliers: Vec<f64>,
    pub holding_periods: Vec<u32>,
    pub signal_score_floors: Vec<f64>,
    /// Carried from the centre unchanged.
    pub min_risk_reward: f64,
    pub min_indicator_consensus: u32,
}

impl ParamGrid {
    pub fn around(center: &ParameterSet, bounds: &GridBounds, signal_score_floors: &[f64]) -> Self {
        Self {
            tp_multipliers: sample_f64(center.atr_tp_multiplier(), bounds.tp_min, bounds.tp_max),
            stop_multipliers: sample_f64(
                center.atr_stop_multiplier(),
                bounds.stop_min,
                bounds.stop_max,
            ),
            holding_periods: sample_u32(
                center.max_holding_periods(),
                bounds.holding_min,
                bounds.holding_max,
            ),
            signal_score_floors: signal_score_floors.to_vec(),
            min_risk_reward: center.min_risk_reward(),
            min_indicator_consensus: center.min_indicator_consensus(),
        }
    }

    /// Number of combinations in this grid.
    pub fn size(&self) -> usize {
        self.tp_multipliers.len()
            * self.stop_multipliers.len()
            * self.holding_periods.len()
            * self.signal_score_floors.len()
    }

    /// All combinations, TP-major.
    pub fn generate(&self) -> Result<Vec<ParameterSet>, ParamError> {
        let mut sets = Vec::with_capacity(self.size());
        for &tp in &self.tp_multipliers {
            for &stop in &self.stop_multipliers {
                for &holding in &self.holding_periods {
                    for &floor in &self.signal_score_floors {
                        sets.push(ParameterSet::new(ParameterSetRecord {
                            min_risk_reward: self.min_risk_reward,
                            min_signal_score: floor,
                            min_indicator_consensus: self.min_indicator_consensus,
                            atr_stop_multiplier: stop,
                            atr_tp_multiplier: tp,
                            max_holding_periods: holding,
                        })?);
                    }
                }
            }
        }
        Ok(sets)
    }
}
