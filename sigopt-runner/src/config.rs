//! Optimizer configuration, loaded from TOML.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! Unknown keys are rejected at load time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sigopt_core::domain::{ParameterSet, SignalType};
use sigopt_core::{IntrabarPolicy, OpportunityConfig};

use crate::explorer::{ExplorerConfig, ExplorerProfile};
use crate::refiner::RefinerConfig;
use crate::validator::ValidatorConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Trade replay settings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub intrabar_policy: IntrabarPolicy,
}

/// Conservative parameter sets published when nothing better survives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafeDefaults {
    pub scalping: ParameterSet,
    pub swing: ParameterSet,
}

impl Default for SafeDefaults {
    fn default() -> Self {
        Self {
            scalping: ParameterSet::SAFE_SCALPING,
            swing: ParameterSet::SAFE_SWING,
        }
    }
}

impl SafeDefaults {
    pub fn get(&self, signal_type: SignalType) -> ParameterSet {
        match signal_type {
            SignalType::Scalping => self.scalping,
            SignalType::Swing => self.swing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub opportunity: OpportunityConfig,
    pub simulation: SimulationConfig,
    pub explorer: ExplorerConfig,
    pub refiner: RefinerConfig,
    pub validator: ValidatorConfig,
    pub safe_defaults: SafeDefaults,
}

impl OptimizerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let opp = &self.opportunity;
        if opp.lookahead_ticks == 0 {
            return Err(ConfigError::Invalid(
                "opportunity.lookahead_ticks must be positive".into(),
            ));
        }
        if opp.scalping_window_ticks == 0 || opp.scalping_window_ticks > opp.lookahead_ticks {
            return Err(ConfigError::Invalid(format!(
                "opportunity.scalping_window_ticks must be within [1, {}], got {}",
                opp.lookahead_ticks, opp.scalping_window_ticks
            )));
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(opp.scalping_threshold_pct) || !positive(opp.swing_threshold_pct) {
            return Err(ConfigError::Invalid(
                "opportunity thresholds must be positive".into(),
            ));
        }

        if self.explorer.max_combinations == 0 {
            return Err(ConfigError::Invalid(
                "explorer.max_combinations must be positive".into(),
            ));
        }
        for st in SignalType::ALL {
            self.validate_profile(st, self.explorer.profile(st))?;
            let hold = self.safe_defaults.get(st).max_holding_periods();
            if hold as usize > opp.lookahead_ticks {
                return Err(ConfigError::Invalid(format!(
                    "safe_defaults.{st}.max_holding_periods {hold} exceeds opportunity.lookahead_ticks {}",
                    opp.lookahead_ticks
                )));
            }
        }

        self.refiner.validate()?;
        self.validator.validate()
    }

    fn validate_profile(&self, st: SignalType, profile: &ExplorerProfile) -> Result<(), ConfigError> {
        if !profile.weights.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "explorer.{st}.weights must be non-negative with a positive sum"
            )));
        }
        if !(profile.profit_scale_pct.is_finite() && profile.profit_scale_pct > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "explorer.{st}.profit_scale_pct must be positive, got {}",
                profile.profit_scale_pct
            )));
        }
        if !profile.bounds.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "explorer.{st}.bounds are inconsistent"
            )));
        }
        // forward paths end after lookahead_ticks, longer holds are never replayed
        if profile.bounds.holding_max as usize > self.opportunity.lookahead_ticks {
            return Err(ConfigError::Invalid(format!(
                "explorer.{st}.bounds.holding_max {} exceeds opportunity.lookahead_ticks {}",
                profile.bounds.holding_max, self.opportunity.lookahead_ticks
            )));
        }
        if profile.signal_score_floors.is_empty()
            || profile
                .signal_score_floors
                .iter()
                .any(|f| !f.is_finite() || *f < 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "explorer.{st}.signal_score_floors must be non-empty, finite and non-negative"
            )));
        }
        let size = profile.max_grid_size();
        if size > self.explorer.max_combinations {
            return Err(ConfigError::Invalid(format!(
                "explorer.{st} grid can reach {size} combinations, limit is {}",
                self.explorer.max_combinations
            )));
        }
        Ok(())
    }

    /// BLAKE3 of the serialized configuration. Part of the run id.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = OptimizerConfig::from_toml_str("").unwrap();
        assert_eq!(config, OptimizerConfig::default());
        assert_eq!(config.refiner.capture_floor_ratio, 0.9);
        assert_eq!(config.simulation.intrabar_policy, IntrabarPolicy::WorstCase);
    }

    #[test]
    fn partial_sections_override_defaults() {
        let toml = r#"
            [simulation]
            intrabar_policy = "best_case"

            [refiner]
            seed = 7
            perturbations = 1

            [safe_defaults.swing]
            min_risk_reward = 1.4
            min_signal_score = 72.0
            min_indicator_consensus = 3
            atr_stop_multiplier = 1.5
            atr_tp_multiplier = 2.5
            max_holding_periods = 48
        "#;
        let config = OptimizerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.simulation.intrabar_policy, IntrabarPolicy::BestCase);
        assert_eq!(config.refiner.seed, 7);
        assert_eq!(config.refiner.blend_weight, 0.5);
        assert_eq!(config.safe_defaults.swing.max_holding_periods(), 48);
        assert_eq!(config.safe_defaults.scalping, ParameterSet::SAFE_SCALPING);
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = OptimizerConfig::from_toml_str("[refiner]\ncapture_floor = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_safe_default_rejected_at_parse() {
        let toml = r#"
            [safe_defaults.scalping]
            min_risk_reward = 1.0
            min_signal_score = 60.0
            min_indicator_consensus = 2
            atr_stop_multiplier = -1.0
            atr_tp_multiplier = 1.5
            max_holding_periods = 8
        "#;
        assert!(OptimizerConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn oversized_grid_rejected() {
        let toml = r#"
            [explorer]
            max_combinations = 20
        "#;
        let err = OptimizerConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("combinations")));
    }

    #[test]
    fn window_longer_than_lookahead_rejected() {
        let mut config = OptimizerConfig::default();
        config.opportunity.scalping_window_ticks = config.opportunity.lookahead_ticks + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn holding_beyond_lookahead_rejected() {
        let config = OptimizerConfig::default();
        let lookahead = config.opportunity.lookahead_ticks as u32;
        assert!(config.explorer.swing.bounds.holding_max <= lookahead);

        let mut long_bounds = config.clone();
        long_bounds.explorer.swing.bounds.holding_max = lookahead + 24;
        let err = long_bounds.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("holding_max")));

        let mut short_lookahead = config.clone();
        short_lookahead.opportunity.lookahead_ticks = 48;
        assert!(short_lookahead.validate().is_err());

        let mut long_safe = config;
        let mut rec = long_safe.safe_defaults.swing.record();
        rec.max_holding_periods = lookahead + 1;
        long_safe.safe_defaults.swing = ParameterSet::new(rec).unwrap();
        let err = long_safe.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("safe_defaults")));
    }

    #[test]
    fn sample_config_parses() {
        let config = OptimizerConfig::from_toml_str(include_str!("../../demos/sigopt.toml")).unwrap();
        assert_eq!(config, OptimizerConfig::default());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = OptimizerConfig::default();
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.refiner.seed = 43;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
