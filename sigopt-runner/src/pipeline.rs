//! Optimizer: wires identification, the three phases, the fallback cascade
//! and the publisher into one run.
//!
//! Entry point: [`Optimizer::run_optimization`]. Every run ends in a terminal
//! [`RunStatus`]; the config store is either fully updated or untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use sigopt_core::domain::{MarketSnapshot, Opportunity, ParameterSet, RunId, SignalType};
use sigopt_core::identify_all;

use crate::advisory::{AdvisoryRequest, BaselineSummary, ParameterAdvisory, Suggestions};
use crate::audit::{AuditSink, OptimizationRound, Phase};
use crate::config::{ConfigError, OptimizerConfig};
use crate::config_store::{AcceptedConfig, ConfigRecord, ConfigStore, ProvenanceRecord};
use crate::explorer::{FastExplorer, OptimizeError, ScoredCandidate};
use crate::fallback::{resolve, ConfigSource, FallbackState, Resolution, RunStatus};
use crate::publisher::publish;
use crate::refiner::{RefinedCandidate, RiskControlledRefiner};
use crate::store::{apply_lookback, SnapshotStore, StoreError};
use crate::validator::{StabilityValidator, Verdict};

/// Errors that abort a run before any side effect.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to load snapshots: {0}")]
    Snapshots(#[source] StoreError),
    #[error("failed to read the current config record: {0}")]
    ConfigStore(#[source] StoreError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("optimization error: {0}")]
    Optimize(#[from] OptimizeError),
    #[error("no signal types requested")]
    NoSignalTypes,
}

// ─── Report ──────────────────────────────────────────────────────────

/// What happened to one requested signal type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalTypeReport {
    pub signal_type: SignalType,
    pub opportunities: usize,
    pub status: RunStatus,
    /// Phase 2 winner; `None` when there was nothing to optimize against.
    pub baseline: Option<ScoredCandidate>,
    /// Phase 3 winner.
    pub refined: Option<RefinedCandidate>,
    /// Phase 4 cascade.
    pub resolution: Option<Resolution>,
    pub suggestions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub lookback_hours: i64,
    pub snapshots: usize,
    pub skipped_ticks: usize,
    /// Final config of every signal type, requested or carried over.
    pub accepted: BTreeMap<SignalType, AcceptedConfig>,
    pub per_type: BTreeMap<SignalType, SignalTypeReport>,
    pub advisory_used: bool,
    pub published: bool,
    pub publish_error: Option<String>,
}

// ─── Optimizer ───────────────────────────────────────────────────────

/// Phase 2 output carried into Phases 3 and 4.
struct Phase2Baseline {
    opportunities: Vec<Opportunity>,
    best: ScoredCandidate,
    runners_up: Vec<ParameterSet>,
}

pub struct Optimizer {
    config: OptimizerConfig,
    snapshots: Arc<dyn SnapshotStore>,
    advisory: Arc<dyn ParameterAdvisory>,
    configs: Arc<dyn ConfigStore>,
    audit: Arc<dyn AuditSink>,
    parallel: bool,
}

impl Optimizer {
    /// Build an optimizer. The configuration is validated here.
    pub fn new(
        config: OptimizerConfig,
        snapshots: Arc<dyn SnapshotStore>,
        advisory: Arc<dyn ParameterAdvisory>,
        configs: Arc<dyn ConfigStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            snapshots,
            advisory,
            configs,
            audit,
            parallel: true,
        })
    }

    /// Enables or disables parallel evaluation in Phases 2 and 3. Both
    /// settings produce identical results.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn run_id(&self, lookback: Duration, signal_types: &[SignalType], snapshots: &[MarketSnapshot]) -> RunId {
        let mut hasher = blake3::Hasher::new();
        for snap in snapshots {
            hasher.update(&serde_json::to_vec(snap).unwrap_or_default());
        }
        let data = hasher.finalize();
        let config = self.config.fingerprint();
        let lookback = lookback.num_seconds().to_le_bytes();
        let types = signal_types
            .iter()
            .map(|st| st.as_str())
            .collect::<Vec<_>>()
            .join(",");
        RunId::from_parts([
            config.as_bytes(),
            &lookback[..],
            types.as_bytes(),
            &data.as_bytes()[..],
        ])
    }

    /// Run the full pipeline and publish the outcome.
    pub fn run_optimization(
        &self,
        lookback: Duration,
        signal_types: &[SignalType],
    ) -> Result<RunReport, RunError> {
        let mut requested = signal_types.to_vec();
        requested.sort();
        requested.dedup();
        if requested.is_empty() {
            return Err(RunError::NoSignalTypes);
        }

        let snapshots = apply_lookback(
            self.snapshots.load_all().map_err(RunError::Snapshots)?,
            lookback,
        );
        let previous = self.configs.load().map_err(RunError::ConfigStore)?;
        let run_id = self.run_id(lookback, &requested, &snapshots);
        info!(
            run_id = %run_id.short(),
            snapshots = snapshots.len(),
            lookback_hours = lookback.num_hours(),
            "optimization run started"
        );

        let identified = identify_all(&snapshots, &self.config.opportunity);
        let policy = self.config.simulation.intrabar_policy;
        let mut rounds = Vec::new();

        // Phase 2
        let mut baselines: BTreeMap<SignalType, Phase2Baseline> = BTreeMap::new();
        let mut per_type = BTreeMap::new();
        for &st in &requested {
            let opps = identified.of_type(st);
            per_type.insert(
                st,
                SignalTypeReport {
                    signal_type: st,
                    opportunities: opps.len(),
                    status: RunStatus::RolledBack,
                    baseline: None,
                    refined: None,
                    resolution: None,
                    suggestions: 0,
                },
            );
            if opps.is_empty() {
                warn!(signal_type = %st, "no opportunities, retaining previous config");
                continue;
            }
            let center = previous
                .as_ref()
                .and_then(|p| p.get(st))
                .map(|accepted| accepted.params);
            let explorer = FastExplorer::new(&self.config.explorer, st, policy)
                .with_parallelism(self.parallel && self.config.explorer.parallel);
            let outcome = explorer.explore(&opps, center.as_ref())?;
            rounds.extend(outcome.evaluated.iter().map(|c| OptimizationRound {
                run_id: run_id.clone(),
                phase: Phase::Phase2,
                signal_type: st,
                label: c.label.clone(),
                params: c.params,
                result: c.result.clone(),
                score: c.score,
                rejected: false,
            }));
            let runners_up = outcome.runners_up(self.config.refiner.grid_starts);
            baselines.insert(
                st,
                Phase2Baseline {
                    opportunities: opps,
                    best: outcome.best,
                    runners_up,
                },
            );
        }

        let (suggestions, advisory_used) = self.ask_advisory(&run_id, &baselines);

        // Phases 3 and 4
        let mut accepted = BTreeMap::new();
        let now = Utc::now().naive_utc();
        for report in per_type.values_mut() {
            let st = report.signal_type;
            let Some(Phase2Baseline {
                opportunities: opps,
                best: baseline,
                runners_up,
            }) = baselines.get(&st)
            else {
                let retained = self.retained(st, previous.as_ref(), &run_id, now);
                report.status = RunStatus::for_source(retained.source, false);
                accepted.insert(st, retained);
                continue;
            };

            let deltas = suggestions.get(&st).map(Vec::as_slice).unwrap_or(&[]);
            report.suggestions = deltas.len();
            let profit_scale = self.config.explorer.profile(st).profit_scale_pct;
            let holding_limit = u32::try_from(self.config.opportunity.lookahead_ticks).unwrap_or(u32::MAX);
            let refiner = RiskControlledRefiner::new(&self.config.refiner, st, profit_scale, policy)
                .with_parallelism(self.parallel && self.config.refiner.parallel)
                .with_holding_limit(holding_limit);
            let refined = refiner.refine(baseline, deltas, runners_up, opps)?;
            rounds.extend(refined.filter_matrix.iter().map(|c| OptimizationRound {
                run_id: run_id.clone(),
                phase: Phase::Phase3,
                signal_type: st,
                label: format!("matrix[{}]", c.cell),
                params: c.params,
                result: c.result.clone(),
                score: c.score,
                rejected: false,
            }));
            rounds.extend(refined.evaluated.iter().map(|c| OptimizationRound {
                run_id: run_id.clone(),
                phase: Phase::Phase3,
                signal_type: st,
                label: c.origin.label(),
                params: c.params,
                result: c.result.clone(),
                score: c.score,
                rejected: c.rejected,
            }));

            let validator = StabilityValidator::new(&self.config.validator, policy);
            let safe = self.config.safe_defaults.get(st);
            let resolution = resolve(&refined.winner.params, &baseline.params, &safe, |params| {
                validator.validate(params, opps, Some(baseline.result.avg_profit))
            });
            rounds.extend(resolution.validations.iter().map(|(state, v)| OptimizationRound {
                run_id: run_id.clone(),
                phase: Phase::Phase4,
                signal_type: st,
                label: state_label(*state).to_string(),
                params: match state {
                    FallbackState::CandidatePhase3 => refined.winner.params,
                    FallbackState::CandidatePhase2 => baseline.params,
                    FallbackState::SafeDefault => safe,
                },
                result: v.full.clone(),
                score: v.stability_score,
                rejected: !matches!(v.verdict, Verdict::Passed | Verdict::Warning),
            }));

            let status = RunStatus::for_source(resolution.source, resolution.flagged);
            let validation = resolution.accepted_report();
            info!(
                signal_type = %st,
                source = %resolution.source,
                %status,
                "signal type resolved"
            );
            accepted.insert(
                st,
                AcceptedConfig {
                    params: resolution.params,
                    source: resolution.source,
                    verdict: resolution.verdict,
                    flagged: resolution.flagged,
                    stability_score: validation.map(|v| v.stability_score),
                    overfitting_score: validation.map(|v| v.overfitting_score),
                    run_id: run_id.clone(),
                    accepted_at: now,
                },
            );
            report.status = status;
            report.baseline = Some(baseline.clone());
            report.refined = Some(refined.winner);
            report.resolution = Some(resolution);
        }

        // Signal types not requested keep what the store has.
        for st in SignalType::ALL {
            if !accepted.contains_key(&st) {
                let carried = match previous.as_ref().and_then(|p| p.get(st)) {
                    Some(cfg) => cfg.clone(),
                    None => self.safe_default(st, &run_id, now),
                };
                accepted.insert(st, carried);
            }
        }

        let mut status = per_type
            .values()
            .map(|r| r.status)
            .max()
            .unwrap_or(RunStatus::Failed);

        let record = ConfigRecord {
            run_id: run_id.clone(),
            published_at: now,
            configs: accepted.clone(),
        };
        let provenance = ProvenanceRecord::for_record(&record, status);
        let publish_error = match publish(self.configs.as_ref(), &record, &provenance, previous.as_ref()) {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, "publish failed, previous config remains in force");
                status = RunStatus::Failed;
                Some(err.to_string())
            }
        };

        if let Err(err) = self.audit.record(&rounds) {
            warn!(error = %err, rounds = rounds.len(), "failed to write audit rounds");
        }

        info!(run_id = %run_id.short(), %status, "optimization run finished");
        Ok(RunReport {
            run_id,
            status,
            lookback_hours: lookback.num_hours(),
            snapshots: snapshots.len(),
            skipped_ticks: identified.skipped,
            accepted,
            per_type,
            advisory_used,
            published: publish_error.is_none(),
            publish_error,
        })
    }

    /// One advisory call covering every baseline. Failure means no suggestions.
    fn ask_advisory(
        &self,
        run_id: &RunId,
        baselines: &BTreeMap<SignalType, Phase2Baseline>,
    ) -> (Suggestions, bool) {
        if baselines.is_empty() {
            return (Suggestions::new(), false);
        }
        let request = AdvisoryRequest {
            run_id: run_id.clone(),
            baselines: baselines
                .iter()
                .map(|(st, baseline)| {
                    (
                        *st,
                        BaselineSummary {
                            params: baseline.best.params,
                            result: baseline.best.result.clone(),
                            opportunities: baseline.opportunities.len(),
                        },
                    )
                })
                .collect(),
        };
        match self.advisory.suggest(&request) {
            Ok(suggestions) => {
                let total: usize = suggestions.values().map(Vec::len).sum();
                info!(advisory = self.advisory.name(), suggestions = total, "advisory answered");
                (suggestions, true)
            }
            Err(err) => {
                warn!(
                    advisory = self.advisory.name(),
                    error = %err,
                    "advisory unavailable, refining baseline only"
                );
                (Suggestions::new(), false)
            }
        }
    }

    fn safe_default(&self, st: SignalType, run_id: &RunId, now: NaiveDateTime) -> AcceptedConfig {
        AcceptedConfig {
            params: self.config.safe_defaults.get(st),
            source: ConfigSource::SafeDefault,
            verdict: None,
            flagged: false,
            stability_score: None,
            overfitting_score: None,
            run_id: run_id.clone(),
            accepted_at: now,
        }
    }

    /// Previous accepted config, re-stamped as retained by this run.
    fn retained(
        &self,
        st: SignalType,
        previous: Option<&ConfigRecord>,
        run_id: &RunId,
        now: NaiveDateTime,
    ) -> AcceptedConfig {
        match previous.and_then(|p| p.get(st)) {
            Some(cfg) => AcceptedConfig {
                source: ConfigSource::Retained,
                run_id: run_id.clone(),
                accepted_at: now,
                ..cfg.clone()
            },
            None => self.safe_default(st, run_id, now),
        }
    }
}

fn state_label(state: FallbackState) -> &'static str {
    match state {
        FallbackState::CandidatePhase3 => "validate[phase3]",
        FallbackState::CandidatePhase2 => "validate[phase2]",
        FallbackState::SafeDefault => "validate[safe_default]",
    }
}

/// Parameters currently published for `signal_type`, if any.
pub fn current_params(store: &dyn ConfigStore, signal_type: SignalType) -> Result<Option<ParameterSet>, StoreError> {
    Ok(store
        .load()?
        .and_then(|record| record.get(signal_type).map(|cfg| cfg.params)))
}
