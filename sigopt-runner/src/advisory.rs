//! External parameter advisory: optional source of suggested parameter
//! deltas, consulted once per run after Phase 2.
//!
//! Failure is never fatal: the caller degrades Phase 3 to baseline-only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use sigopt_core::domain::{ParameterDelta, ParameterSet, RunId, SignalType};
use sigopt_core::SimulationResult;

/// Suggested deltas per signal type.
pub type Suggestions = BTreeMap<SignalType, Vec<ParameterDelta>>;

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("advisory unavailable: {0}")]
    Unavailable(String),
    #[error("advisory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("advisory returned HTTP {0}")]
    Status(u16),
    #[error("failed to read suggestions from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed suggestions: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Phase 2 outcome of one signal type, as shown to the advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSummary {
    pub params: ParameterSet,
    pub result: SimulationResult,
    pub opportunities: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    pub run_id: RunId,
    pub baselines: BTreeMap<SignalType, BaselineSummary>,
}

pub trait ParameterAdvisory: Send + Sync {
    /// Suggested deltas for the request's baselines. Signal types absent from
    /// the answer get no suggestions.
    fn suggest(&self, request: &AdvisoryRequest) -> Result<Suggestions, AdvisoryError>;

    /// Name of this advisory (for logging).
    fn name(&self) -> &str;
}

/// Never suggests anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdvisory;

impl ParameterAdvisory for NoAdvisory {
    fn suggest(&self, _request: &AdvisoryRequest) -> Result<Suggestions, AdvisoryError> {
        Ok(Suggestions::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Fixed suggestions, typically loaded from a JSON file of the form
/// `{"scalping": [{...delta...}], "swing": [...]}`.
#[derive(Debug, Clone, Default)]
pub struct StaticAdvisory {
    suggestions: Suggestions,
}

impl StaticAdvisory {
    pub fn new(suggestions: Suggestions) -> Self {
        Self { suggestions }
    }

    pub fn from_json_str(json: &str) -> Result<Self, AdvisoryError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_file(path: &Path) -> Result<Self, AdvisoryError> {
        let json = std::fs::read_to_string(path).map_err(|source| AdvisoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

impl ParameterAdvisory for StaticAdvisory {
    fn suggest(&self, request: &AdvisoryRequest) -> Result<Suggestions, AdvisoryError> {
        Ok(self
            .suggestions
            .iter()
            .filter(|(st, _)| request.baselines.contains_key(st))
            .map(|(st, deltas)| (*st, deltas.clone()))
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Blocking JSON POST of the [`AdvisoryRequest`]; the response body is a
/// [`Suggestions`] object.
pub struct HttpAdvisory {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpAdvisory {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AdvisoryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sigopt/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl ParameterAdvisory for HttpAdvisory {
    fn suggest(&self, request: &AdvisoryRequest) -> Result<Suggestions, AdvisoryError> {
        debug!(endpoint = %self.endpoint, run_id = %request.run_id.short(), "requesting suggestions");
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    AdvisoryError::Unavailable(e.to_string())
                } else {
                    AdvisoryError::Http(e)
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdvisoryError::Status(status.as_u16()));
        }
        Ok(response.json::<Suggestions>()?)
    }

    fn name(&self) -> &str {
        "http"
    }
}
