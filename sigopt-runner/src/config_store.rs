//! Shared configuration store: the accepted parameter sets the live loop
//! reads, plus an append-only provenance trail.
//!
//! Adapters:
//! - `MemoryConfigStore` (RwLock; failure injection for tests)
//! - `JsonFileConfigStore` (temp file + fsync + rename; provenance as JSONL)

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use sigopt_core::domain::{ParameterSet, RunId, SignalType};

use crate::fallback::{ConfigSource, RunStatus};
use crate::store::StoreError;
use crate::validator::Verdict;

// ─── Records ─────────────────────────────────────────────────────────

/// Final parameter set of one signal type, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedConfig {
    pub params: ParameterSet,
    pub source: ConfigSource,
    /// Verdict of `params` itself, when it was validated this run.
    pub verdict: Option<Verdict>,
    /// Accepted with a WARNING verdict.
    #[serde(default)]
    pub flagged: bool,
    pub stability_score: Option<f64>,
    pub overfitting_score: Option<u32>,
    pub run_id: RunId,
    pub accepted_at: NaiveDateTime,
}

/// Everything the store holds: one accepted config per signal type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub run_id: RunId,
    pub published_at: NaiveDateTime,
    pub configs: BTreeMap<SignalType, AcceptedConfig>,
}

impl ConfigRecord {
    pub fn get(&self, signal_type: SignalType) -> Option<&AcceptedConfig> {
        self.configs.get(&signal_type)
    }

    /// First signal type with no accepted config.
    pub fn missing(&self) -> Option<SignalType> {
        SignalType::ALL
            .into_iter()
            .find(|st| !self.configs.contains_key(st))
    }

    /// BLAKE3 over the published parameter sets, in signal-type order.
    pub fn params_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (st, cfg) in &self.configs {
            hasher.update(st.as_str().as_bytes());
            hasher.update(cfg.params.fingerprint().as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub source: ConfigSource,
    pub verdict: Option<Verdict>,
    pub stability_score: Option<f64>,
    pub overfitting_score: Option<u32>,
}

/// One line of the provenance trail, appended per successful publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub run_id: RunId,
    pub status: RunStatus,
    pub published_at: NaiveDateTime,
    pub entries: BTreeMap<SignalType, ProvenanceEntry>,
    pub params_hash: String,
}

impl ProvenanceRecord {
    pub fn for_record(record: &ConfigRecord, status: RunStatus) -> Self {
        Self {
            run_id: record.run_id.clone(),
            status,
            published_at: record.published_at,
            entries: record
                .configs
                .iter()
                .map(|(st, cfg)| {
                    (
                        *st,
                        ProvenanceEntry {
                            source: cfg.source,
                            verdict: cfg.verdict,
                            stability_score: cfg.stability_score,
                            overfitting_score: cfg.overfitting_score,
                        },
                    )
                })
                .collect(),
            params_hash: record.params_hash(),
        }
    }
}

// ─── Trait ───────────────────────────────────────────────────────────

pub trait ConfigStore: Send + Sync {
    /// The current record, if any run has published.
    fn load(&self) -> Result<Option<ConfigRecord>, StoreError>;

    /// Atomically replace the whole record.
    fn replace(&self, record: &ConfigRecord) -> Result<(), StoreError>;

    /// Put back a previously loaded record (`None` clears the store).
    fn restore(&self, previous: Option<&ConfigRecord>) -> Result<(), StoreError>;

    fn append_provenance(&self, record: &ProvenanceRecord) -> Result<(), StoreError>;
}

// ─── In-memory ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    record: RwLock<Option<ConfigRecord>>,
    provenance: Mutex<Vec<ProvenanceRecord>>,
    fail_replace: AtomicBool,
    fail_provenance: AtomicBool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: ConfigRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
            ..Self::default()
        }
    }

    /// Make every `replace` fail until reset.
    pub fn set_fail_replace(&self, fail: bool) {
        self.fail_replace.store(fail, Ordering::SeqCst);
    }

    /// Make every `append_provenance` fail until reset.
    pub fn set_fail_provenance(&self, fail: bool) {
        self.fail_provenance.store(fail, Ordering::SeqCst);
    }

    pub fn provenance(&self) -> Result<Vec<ProvenanceRecord>, StoreError> {
        Ok(self
            .provenance
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .clone())
    }

    fn write(&self, record: Option<ConfigRecord>) -> Result<(), StoreError> {
        *self.record.write().map_err(|_| StoreError::Poisoned)? = record;
        Ok(())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Option<ConfigRecord>, StoreError> {
        Ok(self.record.read().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn replace(&self, record: &ConfigRecord) -> Result<(), StoreError> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("injected replace failure".into()));
        }
        self.write(Some(record.clone()))
    }

    fn restore(&self, previous: Option<&ConfigRecord>) -> Result<(), StoreError> {
        self.write(previous.cloned())
    }

    fn append_provenance(&self, record: &ProvenanceRecord) -> Result<(), StoreError> {
        if self.fail_provenance.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("injected provenance failure".into()));
        }
        self.provenance
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .push(record.clone());
        Ok(())
    }
}

// ─── JSON file ───────────────────────────────────────────────────────

/// Record as a JSON file, provenance as JSON lines next to it.
#[derive(Debug, Clone)]
pub struct JsonFileConfigStore {
    path: PathBuf,
    provenance_path: PathBuf,
}

impl JsonFileConfigStore {
    /// Provenance defaults to `<path>.provenance.jsonl`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let provenance_path = path.with_extension("provenance.jsonl");
        Self {
            path,
            provenance_path,
        }
    }

    pub fn with_provenance_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.provenance_path = path.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn provenance_path(&self) -> &Path {
        &self.provenance_path
    }

    /// Every provenance line. Malformed lines are skipped.
    pub fn read_provenance(&self) -> Result<Vec<ProvenanceRecord>, StoreError> {
        let file = match fs::File::open(&self.provenance_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.provenance_path, e)),
        };
        let mut records = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line.map_err(|e| StoreError::io(&self.provenance_path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ProvenanceRecord>(&line) {
                Ok(record) => records.push(record),
                Err(err) => warn!(error = %err, "skipping malformed provenance line"),
            }
        }
        Ok(records)
    }

    fn write_atomic(&self, record: &ConfigRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(record)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::io(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn load(&self) -> Result<Option<ConfigRecord>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    fn replace(&self, record: &ConfigRecord) -> Result<(), StoreError> {
        self.write_atomic(record)
    }

    fn restore(&self, previous: Option<&ConfigRecord>) -> Result<(), StoreError> {
        match previous {
            Some(record) => self.write_atomic(record),
            None => match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::io(&self.path, e)),
            },
        }
    }

    fn append_provenance(&self, record: &ProvenanceRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        if let Some(parent) = self.provenance_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.provenance_path)
            .map_err(|e| StoreError::io(&self.provenance_path, e))?;
        writeln!(file, "{json}")
            .and_then(|_| file.flush())
            .map_err(|e| StoreError::io(&self.provenance_path, e))
    }
}
