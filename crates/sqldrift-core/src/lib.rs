//! sqldrift Core Library
//!
//! Detects models whose compiled SQL depends on the build context: manifest
//! extraction, raw template scanning, base-mode classification and compiled
//! SQL diffing.

pub mod classifier;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod normalize;
pub mod obs;
pub mod report;
pub mod rowcount;
pub mod scanner;
pub mod signal;
pub mod telemetry;

pub use classifier::{
    classify, decide, explain, ClassificationResult, ClassifierInput, ConditionalModels,
    Confidence, Decision, Recommendation, LARGE_PROJECT_MODELS,
};
pub use diff::{
    diff_corpora, diff_entries, line_diff, CorpusEntry, DiffFinding, DiffOptions, DiffReport,
    DiffStatus, DiffSummary, DirectoryCorpus, ManifestCorpus, SqlCorpus,
};
pub use error::{DriftError, Result};
pub use manifest::{
    Manifest, Materialization, MaterializationCounts, ModelRecord, ProjectMetadata,
    SnapshotRecord, SourceCoverage, SourceRecord,
};
pub use normalize::{normalize_sql, strip_sql_comments, SqlNormalizer, SCHEMA_PLACEHOLDER};
pub use report::{
    render_detect, render_diff, render_row_counts, DetectReport, DiffOutput, MissingModel,
    NonDeterministicModel,
};
pub use rowcount::{
    compare_row_counts, compare_sources, JsonCountsFile, RowCountComparison, RowCountRow,
    RowCountSource, RowCountStatus,
};
pub use scanner::{PatternFinding, PatternMatch, PatternScanner, Signature, SignatureTable};
pub use signal::{Direction, Signal, Weight};

pub use obs::{
    emit_approach_scored, emit_classification_decided, emit_diff_completed,
    emit_manifest_loaded, emit_producer_degraded, emit_scan_completed, AnalysisSpan,
};
pub use telemetry::init_tracing;

/// sqldrift version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
