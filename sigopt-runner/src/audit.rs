//! Optimization audit log: one round per evaluated candidate, append-only.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use sigopt_core::domain::{ParameterSet, RunId, SignalType};
use sigopt_core::SimulationResult;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Fast explorer grid.
    Phase2,
    /// Risk-controlled refiner candidates.
    Phase3,
    /// Stability validation of a cascade candidate.
    Phase4,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRound {
    pub run_id: RunId,
    pub phase: Phase,
    pub signal_type: SignalType,
    pub label: String,
    pub params: ParameterSet,
    pub result: SimulationResult,
    pub score: f64,
    /// Disqualified by the capture floor, or rejected by validation.
    #[serde(default)]
    pub rejected: bool,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, rounds: &[OptimizationRound]) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    rounds: Mutex<Vec<OptimizationRound>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rounds(&self) -> Vec<OptimizationRound> {
        self.rounds.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, rounds: &[OptimizationRound]) -> Result<(), StoreError> {
        self.rounds
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .extend_from_slice(rounds);
        Ok(())
    }
}

/// JSON lines, one round per line.
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every round. Malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<OptimizationRound>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        let mut rounds = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line.map_err(|e| StoreError::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(round) => rounds.push(round),
                Err(err) => warn!(error = %err, "skipping malformed audit line"),
            }
        }
        Ok(rounds)
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, rounds: &[OptimizationRound]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        for round in rounds {
            let json = serde_json::to_string(round)?;
            writeln!(file, "{json}").map_err(|e| StoreError::io(&self.path, e))?;
        }
        file.flush().map_err(|e| StoreError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(label: &str, rejected: bool) -> OptimizationRound {
        OptimizationRound {
            run_id: RunId::from_bytes(b"audit"),
            phase: Phase::Phase3,
            signal_type: SignalType::Scalping,
            label: label.into(),
            params: ParameterSet::SAFE_SCALPING,
            result: SimulationResult::default(),
            score: 0.25,
            rejected,
        }
    }

    #[test]
    fn jsonl_appends_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("nested/audit.jsonl"));
        log.record(&[round("baseline", false)]).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .and_then(|mut f| writeln!(f, "{{not json"))
            .unwrap();
        log.record(&[round("merge[0]", true)]).unwrap();

        let rounds = log.read_all().unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[1].label, "merge[0]");
        assert!(rounds[1].rejected);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("none.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn memory_log_keeps_order() {
        let log = MemoryAuditLog::new();
        log.record(&[round("a", false), round("b", false)]).unwrap();
        log.record(&[round("c", true)]).unwrap();
        let labels: Vec<_> = log.rounds().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, ["a", "b", "c"]);
    }
}
