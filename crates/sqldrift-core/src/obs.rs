//! Structured observability hooks for analysis runs.
//!
//! Provides an `AnalysisSpan` RAII guard that tags every log line of a run,
//! plus emission helpers for the lifecycle events of each engine.

use tracing::info;

/// RAII guard that enters an analysis-scoped tracing span.
///
/// ```ignore
/// let _span = AnalysisSpan::enter("detect", "target/manifest.json");
/// ```
pub struct AnalysisSpan {
    _span: tracing::span::EnteredSpan,
}

impl AnalysisSpan {
    /// Create and enter a span tagged with the engine name and its input.
    pub fn enter(engine: &str, input: &str) -> Self {
        let span = tracing::info_span!("sqldrift.analysis", engine = %engine, input = %input);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: manifest loaded and scoped to the root project.
pub fn emit_manifest_loaded(project: &str, models: usize, snapshots: usize, sources: usize) {
    info!(
        event = "manifest.loaded",
        project = %project,
        models = models,
        snapshots = snapshots,
        sources = sources,
    );
}

/// Emit event: pattern scan finished.
pub fn emit_scan_completed(table_version: u32, scanned: usize, flagged: usize) {
    info!(
        event = "scan.completed",
        table_version = table_version,
        scanned = scanned,
        flagged = flagged,
    );
}

/// Emit event: classifier reached a decision.
pub fn emit_classification_decided(recommendation: &str, confidence: &str, signals: usize) {
    info!(
        event = "classification.decided",
        recommendation = %recommendation,
        confidence = %confidence,
        signals = signals,
    );
}

/// Emit event: corpus diff finished.
pub fn emit_diff_completed(
    approach: &str,
    compared: usize,
    non_deterministic: usize,
    missing: usize,
) {
    info!(
        event = "diff.completed",
        approach = %approach,
        compared = compared,
        non_deterministic = non_deterministic,
        missing = missing,
    );
}

/// Emit event: one harness approach scored against ground truth.
pub fn emit_approach_scored(
    approach: &str,
    true_positives: usize,
    false_positives: usize,
    accuracy: f64,
) {
    info!(
        event = "approach.scored",
        approach = %approach,
        true_positives = true_positives,
        false_positives = false_positives,
        accuracy = accuracy,
    );
}

/// Emit event: a producer failed and was degraded to an empty set (warning level).
pub fn emit_producer_degraded(approach: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "approach.degraded", approach = %approach, error = %error);
}
