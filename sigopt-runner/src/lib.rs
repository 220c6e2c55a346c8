//! SigOpt Runner: multi-phase parameter optimization and publishing.
//!
//! This crate builds on `sigopt-core` to provide:
//! - Optimizer configuration (TOML)
//! - Phase 2 fast explorer over a bounded parameter grid
//! - Phase 3 risk-controlled refiner fusing advisory suggestions
//! - Phase 4 stability validator and the cascading fallback table
//! - Snapshot, advisory, config-store and audit adapters
//! - Atomic two-signal-type publisher and the `Optimizer` entry point

pub mod advisory;
pub mod audit;
pub mod config;
pub mod config_store;
pub mod explorer;
pub mod fallback;
pub mod grid;
pub mod pipeline;
pub mod publisher;
pub mod refiner;
pub mod scoring;
pub mod store;
pub mod validator;

pub use advisory::{
    AdvisoryError, AdvisoryRequest, BaselineSummary, HttpAdvisory, NoAdvisory, ParameterAdvisory,
    StaticAdvisory, Suggestions,
};
pub use audit::{AuditSink, JsonlAuditLog, MemoryAuditLog, OptimizationRound, Phase};
pub use config::{ConfigError, OptimizerConfig, SafeDefaults, SimulationConfig};
pub use config_store::{
    AcceptedConfig, ConfigRecord, ConfigStore, JsonFileConfigStore, MemoryConfigStore,
    ProvenanceRecord,
};
pub use explorer::{ExplorerConfig, ExplorerOutcome, FastExplorer, OptimizeError, ScoredCandidate};
pub use fallback::{resolve, transition, ConfigSource, FallbackState, Resolution, RunStatus};
pub use grid::{GridBounds, ParamGrid};
pub use pipeline::{current_params, Optimizer, RunError, RunReport, SignalTypeReport};
pub use publisher::{publish, PublishError};
pub use refiner::{
    CandidateOrigin, FilterCell, FilterCellResult, RefinedCandidate, RefinerConfig, RefinerOutcome,
    RiskControlledRefiner, SearchStart,
};
pub use scoring::ScoreWeights;
pub use store::{CsvSnapshotStore, MemorySnapshotStore, SnapshotStore, StoreError};
pub use validator::{StabilityValidator, ValidationReport, ValidatorConfig, Verdict};
