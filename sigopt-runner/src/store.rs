//! Market snapshot store: read-only source of per-symbol time series.
//!
//! Adapters:
//! - `MemorySnapshotStore` for tests and embedding
//! - `CsvSnapshotStore`: one `<SYMBOL>.csv` per symbol with a header row.
//!   Extra columns are ignored; unparsable rows are skipped with a warning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use sigopt_core::domain::{MarketSnapshot, Symbol};

/// Errors from the storage adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("{0}")]
    Rejected(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read-only snapshot source.
pub trait SnapshotStore: Send + Sync {
    fn symbols(&self) -> Result<Vec<Symbol>, StoreError>;

    /// Every snapshot of one symbol, in store order.
    fn load(&self, symbol: &str) -> Result<Vec<MarketSnapshot>, StoreError>;

    /// Every snapshot of every symbol, grouped by symbol.
    fn load_all(&self) -> Result<Vec<MarketSnapshot>, StoreError> {
        let mut all = Vec::new();
        for symbol in self.symbols()? {
            all.extend(self.load(&symbol)?);
        }
        Ok(all)
    }
}

/// Keep snapshots no older than `lookback` before the newest snapshot.
/// A window reaching past the representable range keeps everything.
pub fn apply_lookback(snapshots: Vec<MarketSnapshot>, lookback: Duration) -> Vec<MarketSnapshot> {
    let Some(newest) = snapshots.iter().map(|s| s.timestamp).max() else {
        return snapshots;
    };
    let Some(cutoff) = newest.checked_sub_signed(lookback) else {
        return snapshots;
    };
    snapshots
        .into_iter()
        .filter(|s| s.timestamp >= cutoff)
        .collect()
}

// ─── In-memory ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    by_symbol: BTreeMap<Symbol, Vec<MarketSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new(snapshots: impl IntoIterator<Item = MarketSnapshot>) -> Self {
        let mut by_symbol: BTreeMap<Symbol, Vec<MarketSnapshot>> = BTreeMap::new();
        for snap in snapshots {
            by_symbol.entry(snap.symbol.clone()).or_default().push(snap);
        }
        Self { by_symbol }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        Ok(self.by_symbol.keys().cloned().collect())
    }

    fn load(&self, symbol: &str) -> Result<Vec<MarketSnapshot>, StoreError> {
        self.by_symbol
            .get(symbol)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSymbol(symbol.to_string()))
    }
}

// ─── CSV directory ───────────────────────────────────────────────────

/// One CSV row. The symbol comes from the file name.
#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    atr: Option<f64>,
    #[serde(default)]
    support: Option<f64>,
    #[serde(default)]
    resistance: Option<f64>,
    #[serde(default)]
    signal_score: Option<f64>,
    #[serde(default)]
    indicator_consensus: Option<u32>,
}

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Directory of `<SYMBOL>.csv` files.
#[derive(Debug, Clone)]
pub struct CsvSnapshotStore {
    dir: PathBuf,
}

impl CsvSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }
}

impl SnapshotStore for CsvSnapshotStore {
    fn symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.dir, e))?.path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if !is_csv {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    fn load(&self, symbol: &str) -> Result<Vec<MarketSnapshot>, StoreError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Err(StoreError::UnknownSymbol(symbol.to_string()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&path)
            .map_err(|source| StoreError::Csv {
                path: path.clone(),
                source,
            })?;

        let mut snapshots = Vec::new();
        let mut skipped = 0usize;
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    warn!(symbol, line = line + 2, error = %err, "skipping unparsable row");
                    skipped += 1;
                    continue;
                }
            };
            let Some(timestamp) = parse_timestamp(&row.timestamp) else {
                warn!(symbol, line = line + 2, raw = %row.timestamp, "skipping row with bad timestamp");
                skipped += 1;
                continue;
            };
            snapshots.push(MarketSnapshot {
                symbol: symbol.to_string(),
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                atr: row.atr,
                support: row.support,
                resistance: row.resistance,
                signal_score: row.signal_score,
                indicator_consensus: row.indicator_consensus,
            });
        }
        debug!(symbol, rows = snapshots.len(), skipped, "loaded snapshots");
        Ok(snapshots)
    }
}
