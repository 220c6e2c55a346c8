//! ParameterSet: the strongly-typed, bounds-checked tuning knobs of one
//! signal type, plus externally suggested deltas and the blend operator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parameter validation and blending.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("{field} must be > 0, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("{field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} does not fit an integer count: {value}")]
    NotACount { field: &'static str, value: f64 },
    #[error("blend weight must be within [0, 1], got {0}")]
    WeightOutOfRange(f64),
}

/// Plain, unvalidated field bag used for construction and deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSetRecord {
    pub min_risk_reward: f64,
    pub min_signal_score: f64,
    pub min_indicator_consensus: u32,
    pub atr_stop_multiplier: f64,
    pub atr_tp_multiplier: f64,
    pub max_holding_periods: u32,
}

/// Validated parameter set for one signal type.
///
/// Invariants (checked on every construction path, including serde):
/// multipliers > 0, `max_holding_periods` > 0, `min_risk_reward` > 0,
/// `min_signal_score` >= 0, all values finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterSetRecord")]
pub struct ParameterSet {
    min_risk_reward: f64,
    min_signal_score: f64,
    min_indicator_consensus: u32,
    atr_stop_multiplier: f64,
    atr_tp_multiplier: f64,
    max_holding_periods: u32,
}

fn finite(field: &'static str, value: f64) -> Result<f64, ParamError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParamError::NonFinite { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, ParamError> {
    let v = finite(field, value)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(ParamError::NonPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, ParamError> {
    let v = finite(field, value)?;
    if v >= 0.0 {
        Ok(v)
    } else {
        Err(ParamError::Negative { field, value })
    }
}

fn count(field: &'static str, value: f64) -> Result<u32, ParamError> {
    let v = non_negative(field, value)?.round();
    if v > u32::MAX as f64 {
        return Err(ParamError::NotACount { field, value });
    }
    Ok(v as u32)
}

impl ParameterSet {
    pub fn new(record: ParameterSetRecord) -> Result<Self, ParamError> {
        positive("min_risk_reward", record.min_risk_reward)?;
        non_negative("min_signal_score", record.min_signal_score)?;
        positive("atr_stop_multiplier", record.atr_stop_multiplier)?;
        positive("atr_tp_multiplier", record.atr_tp_multiplier)?;
        if record.max_holding_periods == 0 {
            return Err(ParamError::NonPositive {
                field: "max_holding_periods",
                value: 0.0,
            });
        }
        Ok(Self {
            min_risk_reward: record.min_risk_reward,
            min_signal_score: record.min_signal_score,
            min_indicator_consensus: record.min_indicator_consensus,
            atr_stop_multiplier: record.atr_stop_multiplier,
            atr_tp_multiplier: record.atr_tp_multiplier,
            max_holding_periods: record.max_holding_periods,
        })
    }

    pub fn record(&self) -> ParameterSetRecord {
        ParameterSetRecord {
            min_risk_reward: self.min_risk_reward,
            min_signal_score: self.min_signal_score,
            min_indicator_consensus: self.min_indicator_consensus,
            atr_stop_multiplier: self.atr_stop_multiplier,
            atr_tp_multiplier: self.atr_tp_multiplier,
            max_holding_periods: self.max_holding_periods,
        }
    }

    pub fn min_risk_reward(&self) -> f64 {
        self.min_risk_reward
    }

    pub fn min_signal_score(&self) -> f64 {
        self.min_signal_score
    }

    pub fn min_indicator_consensus(&self) -> u32 {
        self.min_indicator_consensus
    }

    pub fn atr_stop_multiplier(&self) -> f64 {
        self.atr_stop_multiplier
    }

    pub fn atr_tp_multiplier(&self) -> f64 {
        self.atr_tp_multiplier
    }

    pub fn max_holding_periods(&self) -> u32 {
        self.max_holding_periods
    }

    /// Nominal risk:reward implied by the multipliers alone.
    pub fn nominal_risk_reward(&self) -> f64 {
        self.atr_tp_multiplier / self.atr_stop_multiplier
    }

    /// Exact identity of this parameter set (BLAKE3 over canonical JSON).
    pub fn fingerprint(&self) -> String {
        // Field order is fixed by the struct definition, so the JSON is canonical.
        let json = serde_json::to_string(&self.record()).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

// ─── Presets ─────────────────────────────────────────────────────────

impl ParameterSet {
    /// Default grid centre for scalping exploration.
    pub const SCALPING_CENTER: ParameterSet = ParameterSet {
        min_risk_reward: 1.0,
        min_signal_score: 60.0,
        min_indicator_consensus: 2,
        atr_stop_multiplier: 1.5,
        atr_tp_multiplier: 2.0,
        max_holding_periods: 8,
    };

    /// Default grid centre for swing exploration.
    pub const SWING_CENTER: ParameterSet = ParameterSet {
        min_risk_reward: 1.2,
        min_signal_score: 65.0,
        min_indicator_consensus: 2,
        atr_stop_multiplier: 1.5,
        atr_tp_multiplier: 3.0,
        max_holding_periods: 60,
    };

    /// Conservative scalping preset: tight target, 2h holding.
    pub const SAFE_SCALPING: ParameterSet = ParameterSet {
        min_risk_reward: 1.2,
        min_signal_score: 65.0,
        min_indicator_consensus: 2,
        atr_stop_multiplier: 1.0,
        atr_tp_multiplier: 1.5,
        max_holding_periods: 8,
    };

    /// Conservative swing preset.
    pub const SAFE_SWING: ParameterSet = ParameterSet {
        min_risk_reward: 1.5,
        min_signal_score: 70.0,
        min_indicator_consensus: 2,
        atr_stop_multiplier: 1.5,
        atr_tp_multiplier: 3.0,
        max_holding_periods: 60,
    };
}

impl TryFrom<ParameterSetRecord> for ParameterSet {
    type Error = ParamError;

    fn try_from(record: ParameterSetRecord) -> Result<Self, Self::Error> {
        Self::new(record)
    }
}

/// Externally suggested parameter values. Every field is optional and
/// treated as an opaque number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_risk_reward: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_signal_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_indicator_consensus: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr_stop_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr_tp_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_holding_periods: Option<f64>,
}

impl ParameterDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn blend(base: f64, suggested: Option<f64>, weight: f64) -> f64 {
    match suggested {
        Some(s) => base + weight * (s - base),
        None => base,
    }
}

/// Blend `delta` into `base`: every suggested field moves `weight` of the way
/// from the base value toward the suggestion. Integer fields are rounded.
///
/// `weight = 0` returns `base`; `weight = 1` applies the suggestion verbatim.
/// The result is re-validated.
pub fn merge(
    base: &ParameterSet,
    delta: &ParameterDelta,
    weight: f64,
) -> Result<ParameterSet, ParamError> {
    if !(0.0..=1.0).contains(&weight) || weight.is_nan() {
        return Err(ParamError::WeightOutOfRange(weight));
    }
    let record = ParameterSetRecord {
        min_risk_reward: blend(base.min_risk_reward, delta.min_risk_reward, weight),
        min_signal_score: blend(base.min_signal_score, delta.min_signal_score, weight),
        min_indicator_consensus: count(
            "min_indicator_consensus",
            blend(
                f64::from(base.min_indicator_consensus),
                delta.min_indicator_consensus,
                weight,
            ),
        )?,
        atr_stop_multiplier: blend(base.atr_stop_multiplier, delta.atr_stop_multiplier, weight),
        atr_tp_multiplier: blend(base.atr_tp_multiplier, delta.atr_tp_multiplier, weight),
        max_holding_periods: count(
            "max_holding_periods",
            blend(
                f64::from(base.max_holding_periods),
                delta.max_holding_periods,
                weight,
            ),
        )?,
    };
    ParameterSet::new(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ParameterSet {
        ParameterSet::new(ParameterSetRecord {
            min_risk_reward: 1.0,
            min_signal_score: 60.0,
            min_indicator_consensus: 2,
            atr_stop_multiplier: 1.5,
            atr_tp_multiplier: 2.0,
            max_holding_periods: 8,
        })
        .unwrap()
    }

    #[test]
    fn rejects_non_positive_multiplier() {
        let mut rec = base().record();
        rec.atr_tp_multiplier = 0.0;
        assert!(matches!(
            ParameterSet::new(rec),
            Err(ParamError::NonPositive {
                field: "atr_tp_multiplier",
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_holding() {
        let mut rec = base().record();
        rec.max_holding_periods = 0;
        assert!(ParameterSet::new(rec).is_err());
    }

    #[test]
    fn rejects_nan_risk_reward() {
        let mut rec = base().record();
        rec.min_risk_reward = f64::NAN;
        assert!(matches!(
            ParameterSet::new(rec),
            Err(ParamError::NonFinite { .. })
        ));
    }

    #[test]
    fn deserialization_validates() {
        let bad = r#"{"min_risk_reward":1.0,"min_signal_score":50.0,"min_indicator_consensus":1,
                      "atr_stop_multiplier":-1.0,"atr_tp_multiplier":2.0,"max_holding_periods":4}"#;
        assert!(serde_json::from_str::<ParameterSet>(bad).is_err());

        let good = serde_json::to_string(&base()).unwrap();
        let back: ParameterSet = serde_json::from_str(&good).unwrap();
        assert_eq!(back, base());
    }

    #[test]
    fn merge_weight_zero_is_identity() {
        let delta = ParameterDelta {
            atr_tp_multiplier: Some(4.0),
            max_holding_periods: Some(20.0),
            ..Default::default()
        };
        assert_eq!(merge(&base(), &delta, 0.0).unwrap(), base());
    }

    #[test]
    fn merge_weight_one_applies_suggestion() {
        let delta = ParameterDelta {
            atr_tp_multiplier: Some(4.0),
            ..Default::default()
        };
        let merged = merge(&base(), &delta, 1.0).unwrap();
        assert_eq!(merged.atr_tp_multiplier(), 4.0);
        assert_eq!(merged.atr_stop_multiplier(), 1.5);
    }

    #[test]
    fn merge_half_blends_and_rounds_counts() {
        let delta = ParameterDelta {
            atr_tp_multiplier: Some(3.0),
            max_holding_periods: Some(11.0),
            min_indicator_consensus: Some(3.0),
            ..Default::default()
        };
        let merged = merge(&base(), &delta, 0.5).unwrap();
        assert!((merged.atr_tp_multiplier() - 2.5).abs() < 1e-12);
        // 8 + 0.5 * 3 = 9.5 rounds half away from zero
        assert_eq!(merged.max_holding_periods(), 10);
        // 2 + 0.5 * 1 = 2.5 -> 3
        assert_eq!(merged.min_indicator_consensus(), 3);
    }

    #[test]
    fn merge_rejects_bad_weight_and_bad_result() {
        let delta = ParameterDelta {
            atr_stop_multiplier: Some(-5.0),
            ..Default::default()
        };
        assert!(matches!(
            merge(&base(), &delta, 1.5),
            Err(ParamError::WeightOutOfRange(_))
        ));
        assert!(merge(&base(), &delta, 1.0).is_err());
    }

    #[test]
    fn fingerprint_tracks_values() {
        let a = base();
        let mut rec = a.record();
        rec.max_holding_periods = 9;
        let b = ParameterSet::new(rec).unwrap();
        assert_eq!(a.fingerprint(), base().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn presets_satisfy_invariants() {
        for preset in [
            ParameterSet::SCALPING_CENTER,
            ParameterSet::SWING_CENTER,
            ParameterSet::SAFE_SCALPING,
            ParameterSet::SAFE_SWING,
        ] {
            assert_eq!(ParameterSet::new(preset.record()), Ok(preset));
        }
    }

    #[test]
    fn empty_delta() {
        assert!(ParameterDelta::default().is_empty());
        let delta = ParameterDelta {
            min_signal_score: Some(70.0),
            ..Default::default()
        };
        assert!(!delta.is_empty());
    }
}
