//! Cascading fallback: Phase 3 candidate → Phase 2 baseline → safe default.
//!
//! The cascade is an explicit decision table over `(state, verdict)`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use sigopt_core::domain::ParameterSet;

use crate::validator::{ValidationReport, Verdict};

/// Provenance of an accepted parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Phase3,
    Phase2Baseline,
    SafeDefault,
    /// No opportunities this run; the previous parameters stay in force.
    Retained,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Phase3 => "phase3",
            Self::Phase2Baseline => "phase2_baseline",
            Self::SafeDefault => "safe_default",
            Self::Retained => "retained",
        };
        f.write_str(s)
    }
}

/// Terminal status of a run or of one signal type within it. Ordered from
/// best to worst, so the run status is the maximum over signal types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Passed,
    Warning,
    RolledBack,
    Failed,
}

impl RunStatus {
    /// Status of a signal type given what was accepted for it.
    pub fn for_source(source: ConfigSource, flagged: bool) -> Self {
        match (source, flagged) {
            (ConfigSource::Phase3, false) => Self::Passed,
            (ConfigSource::Phase3, true) => Self::Warning,
            _ => Self::RolledBack,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Passed => "PASSED",
            Self::Warning => "WARNING",
            Self::RolledBack => "ROLLED_BACK",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Candidate currently under validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackState {
    CandidatePhase3,
    CandidatePhase2,
    SafeDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Accept a source; `flagged` marks a WARNING acceptance.
    Accept { source: ConfigSource, flagged: bool },
    /// Validate the next candidate.
    Validate(FallbackState),
}

/// The decision table.
pub fn transition(state: FallbackState, verdict: Verdict) -> Transition {
    use FallbackState::*;
    use Verdict::*;

    match (state, verdict) {
        (CandidatePhase3, Passed) => Transition::Accept {
            source: ConfigSource::Phase3,
            flagged: false,
        },
        (CandidatePhase3, Warning) => Transition::Accept {
            source: ConfigSource::Phase3,
            flagged: true,
        },
        (CandidatePhase3, Overfitted | Unstable) => Transition::Accept {
            source: ConfigSource::Phase2Baseline,
            flagged: false,
        },
        (CandidatePhase3, Failed) => Transition::Validate(CandidatePhase2),
        (CandidatePhase2, Failed) => Transition::Accept {
            source: ConfigSource::SafeDefault,
            flagged: false,
        },
        (CandidatePhase2, _) => Transition::Accept {
            source: ConfigSource::Phase2Baseline,
            flagged: false,
        },
        (SafeDefault, _) => Transition::Accept {
            source: ConfigSource::SafeDefault,
            flagged: false,
        },
    }
}

/// Final decision for one signal type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub source: ConfigSource,
    pub params: ParameterSet,
    /// Verdict of the accepted parameter set, when it was validated itself.
    pub verdict: Option<Verdict>,
    pub flagged: bool,
    /// Every validation performed, in cascade order.
    pub validations: Vec<(FallbackState, ValidationReport)>,
}

impl Resolution {
    /// Report of the accepted parameter set, when it was validated itself.
    pub fn accepted_report(&self) -> Option<&ValidationReport> {
        let state = match self.source {
            ConfigSource::Phase3 => FallbackState::CandidatePhase3,
            ConfigSource::Phase2Baseline => FallbackState::CandidatePhase2,
            _ => return None,
        };
        self.validations
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, report)| report)
    }
}

/// Run the cascade. `validate` is called once per visited candidate.
pub fn resolve<F>(
    phase3: &ParameterSet,
    phase2: &ParameterSet,
    safe_default: &ParameterSet,
    mut validate: F,
) -> Resolution
where
    F: FnMut(&ParameterSet) -> ValidationReport,
{
    let mut state = FallbackState::CandidatePhase3;
    let mut validations = Vec::new();

    loop {
        let candidate = match state {
            FallbackState::CandidatePhase3 => phase3,
            FallbackState::CandidatePhase2 => phase2,
            FallbackState::SafeDefault => safe_default,
        };
        let report = validate(candidate);
        let verdict = report.verdict;
        validations.push((state, report));

        match transition(state, verdict) {
            Transition::Validate(next) => {
                warn!(from = ?state, to = ?next, %verdict, "falling back");
                state = next;
            }
            Transition::Accept { source, flagged } => {
                if source != ConfigSource::Phase3 {
                    warn!(?state, %verdict, %source, "candidate rejected, falling back");
                }
                let params = match source {
                    ConfigSource::Phase3 => *phase3,
                    ConfigSource::Phase2Baseline => *phase2,
                    ConfigSource::SafeDefault | ConfigSource::Retained => *safe_default,
                };
                let mut resolution = Resolution {
                    source,
                    params,
                    verdict: None,
                    flagged,
                    validations,
                };
                resolution.verdict = resolution.accepted_report().map(|r| r.verdict);
                return resolution;
            }
        }
    }
}
