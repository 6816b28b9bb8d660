//! Machine-readable and human-readable report rendering.

use serde::{Deserialize, Serialize};

use crate::classifier::{classify, ClassificationResult, ClassifierInput, Recommendation};
use crate::diff::{DiffReport, DiffStatus};
use crate::manifest::{Manifest, MaterializationCounts, ProjectMetadata};
use crate::obs;
use crate::rowcount::{RowCountComparison, RowCountStatus};
use crate::scanner::{PatternFinding, PatternScanner};

/// Diff lines shown per model in the human diff report.
pub const MAX_REPORTED_DIFF_LINES: usize = 10;

// ---------------------------------------------------------------------------
// Detect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalModel {
    pub name: String,
    pub strategy: Option<String>,
    pub unique_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub name: String,
    pub path: String,
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub total: usize,
    pub materialization_counts: MaterializationCounts,
    pub incremental_models: Vec<IncrementalModel>,
    pub snapshots: Vec<SnapshotSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub total: usize,
    pub with_event_time: usize,
    pub without_event_time: usize,
    pub sources_without_event_time: Vec<String>,
}

/// Full output of `detect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectReport {
    pub models: ModelSummary,
    pub sources: SourceSummary,
    pub sql_findings: Vec<PatternFinding>,
    pub classification: ClassificationResult,
}

impl DetectReport {
    /// Extract, scan and classify one manifest.
    pub fn analyze(manifest: &Manifest, scanner: &PatternScanner) -> Self {
        let project = ProjectMetadata::extract(manifest);
        obs::emit_manifest_loaded(
            &project.project_name,
            project.total_models(),
            project.snapshots.len(),
            project.sources.len(),
        );
        let findings = scanner.scan(&project);
        let classification = classify(&ClassifierInput::from_project(&project, &findings));
        Self::assemble(&project, findings, classification)
    }

    pub fn assemble(
        project: &ProjectMetadata,
        sql_findings: Vec<PatternFinding>,
        classification: ClassificationResult,
    ) -> Self {
        let coverage = project.source_coverage();
        Self {
            models: ModelSummary {
                total: project.total_models(),
                materialization_counts: project.materialization_counts,
                incremental_models: project
                    .incremental_models()
                    .map(|m| IncrementalModel {
                        name: m.name.clone(),
                        strategy: m.incremental_strategy.clone(),
                        unique_key: m.unique_key.clone(),
                    })
                    .collect(),
                snapshots: project
                    .snapshots
                    .iter()
                    .map(|s| SnapshotSummary {
                        name: s.name.clone(),
                        path: s.path.clone(),
                        strategy: s.strategy.clone(),
                    })
                    .collect(),
            },
            sources: SourceSummary {
                total: coverage.total,
                with_event_time: coverage.with_event_time,
                without_event_time: coverage.without_event_time,
                sources_without_event_time: project
                    .sources_without_event_time()
                    .map(|s| s.name.clone())
                    .collect(),
            },
            sql_findings,
            classification,
        }
    }

    /// Names of models the scanner flagged.
    pub fn flagged_models(&self) -> Vec<&str> {
        self.sql_findings.iter().map(|f| f.name.as_str()).collect()
    }
}

pub fn render_detect(report: &DetectReport) -> String {
    let rule = "=".repeat(60);
    let thin = "-".repeat(60);
    let mut out = String::new();
    let c = &report.classification;

    out.push_str(&format!("{rule}\n"));
    out.push_str("  Base Mode Detection Report\n");
    out.push_str(&format!("{rule}\n"));
    out.push('\n');
    match c.recommendation {
        Recommendation::IsolatedBase => {
            out.push_str(&format!(
                "  RECOMMENDATION: Isolated Base ({} confidence)\n",
                c.confidence
            ));
            out.push_str("  Some models compile differently per build context, so a\n");
            out.push_str("  shared base reports differences no code change caused.\n");
            out.push_str("  Build the base in isolation, ideally with --sample.\n");
        }
        Recommendation::SharedBase => {
            out.push_str(&format!(
                "  RECOMMENDATION: Shared Base ({} confidence)\n",
                c.confidence
            ));
            out.push_str("  Every model compiles identically across targets.\n");
            out.push_str("  No special CI configuration needed.\n");
        }
    }
    out.push('\n');
    out.push_str(&format!("{thin}\n"));

    let m = &report.models;
    let mc = &m.materialization_counts;
    out.push_str(&format!("  Models: {} total\n", m.total));
    out.push_str(&format!(
        "    table: {}  view: {}  ephemeral: {}  incremental: {}",
        mc.table,
        mc.view,
        mc.ephemeral,
        mc.incremental,
    ));
    if mc.other > 0 {
        out.push_str(&format!("  other: {}", mc.other));
    }
    out.push('\n');
    if !m.snapshots.is_empty() {
        out.push_str(&format!("  Snapshots: {}\n", m.snapshots.len()));
    }
    out.push('\n');

    let s = &report.sources;
    out.push_str(&format!("  Sources: {} total\n", s.total));
    out.push_str(&format!(
        "    with event_time: {}  without: {}\n",
        s.with_event_time,
        s.without_event_time,
    ));
    if !s.sources_without_event_time.is_empty() {
        out.push_str(&format!(
            "    missing event_time: {}\n",
            s.sources_without_event_time.join(", "),
        ));
    }
    out.push('\n');

    if !m.incremental_models.is_empty() {
        out.push_str("  Incremental models:\n");
        for model in &m.incremental_models {
            let strategy = model.strategy.as_deref().unwrap_or("default");
            match &model.unique_key {
                Some(key) => {
                    out.push_str(&format!(
                        "    - {} (strategy: {strategy}, unique_key: {key})\n",
                        model.name,
                    ));
                }
                None => {
                    out.push_str(&format!("    - {} (strategy: {strategy})\n", model.name));
                }
            }
        }
        out.push('\n');
    }

    if !report.sql_findings.is_empty() {
        out.push_str("  Flagged models:\n");
        for finding in &report.sql_findings {
            out.push_str(&format!(
                "    - {} ({}): {}\n",
                finding.name,
                finding.materialized,
                finding.pattern_names().join(", "),
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!("{thin}\n"));
    out.push_str("  Detection signals:\n");
    out.push('\n');
    for signal in &c.signals {
        let direction = signal.direction.as_str().replace('_', " ");
        out.push_str(&format!(
            "  {} [{direction}] {}\n",
            signal.weight.marker(),
            signal.detail,
        ));
        out.push_str(&format!("      {}\n", signal.reason));
        out.push('\n');
    }
    out.push_str(&rule);
    out
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonDeterministicModel {
    pub model: String,
    pub path: String,
    pub materialized: String,
    pub diff_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingModel {
    pub model: String,
    pub path: String,
    pub status: DiffStatus,
}

/// Machine-readable output of `diff`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOutput {
    pub approach: String,
    pub total_findings: usize,
    pub non_deterministic: Vec<NonDeterministicModel>,
    pub missing: Vec<MissingModel>,
}

impl From<&DiffReport> for DiffOutput {
    fn from(report: &DiffReport) -> Self {
        Self {
            approach: report.approach.clone(),
            total_findings: report.findings.len(),
            non_deterministic: report
                .non_deterministic()
                .map(|f| NonDeterministicModel {
                    model: f.model.clone(),
                    path: f.path.clone(),
                    materialized: f.materialized.clone(),
                    diff_lines: f.diff_lines.clone(),
                })
                .collect(),
            missing: report
                .missing()
                .map(|f| MissingModel {
                    model: f.model.clone(),
                    path: f.path.clone(),
                    status: f.status,
                })
                .collect(),
        }
    }
}

pub fn render_diff(report: &DiffReport) -> String {
    let rule = "=".repeat(70);
    let mut out = String::new();
    let summary = &report.summary;

    out.push_str(&format!("{rule}\n"));
    out.push_str("  Compiled SQL Diff: Non-Deterministic Model Detection\n");
    out.push_str(&format!("  Approach: {}\n", report.approach));
    out.push_str(&format!("{rule}\n"));
    out.push('\n');
    out.push_str(&format!("  Non-deterministic models: {}\n", summary.non_deterministic));
    out.push_str(&format!(
        "  Models compared: {} (identical after normalization: {})\n",
        summary.compared,
        summary.compared - summary.non_deterministic,
    ));
    if summary.missing() > 0 {
        out.push_str(&format!("  Missing in one target: {}\n", summary.missing()));
        for f in report.missing() {
            out.push_str(&format!("    - {} [{}] {}\n", f.model, f.path, f.status));
        }
    }
    out.push('\n');

    let non_det: Vec<_> = report.non_deterministic().collect();
    if non_det.is_empty() {
        out.push_str(
            "  All models produce identical SQL across targets (after schema normalization).\n",
        );
        out.push_str("  Shared base is safe.\n");
    } else {
        out.push_str(&format!("{}\n", "-".repeat(70)));
        out.push_str("  Models with non-deterministic SQL:\n");
        out.push('\n');
        for f in non_det {
            let mat = if f.materialized.is_empty() {
                String::new()
            } else {
                format!(" ({})", f.materialized)
            };
            out.push_str(&format!("  !! {}{mat}  [{}]\n", f.model, f.path));
            for line in f.diff_lines.iter().take(MAX_REPORTED_DIFF_LINES) {
                out.push_str(&format!("       {line}\n"));
            }
            if f.diff_lines.len() > MAX_REPORTED_DIFF_LINES {
                out.push_str(&format!(
                    "       ... ({} changed lines total)\n",
                    f.diff_lines.len(),
                ));
            }
            out.push('\n');
        }
    }
    out.push_str(&rule);
    out
}

// ---------------------------------------------------------------------------
// Row counts
// ---------------------------------------------------------------------------

/// Format an integer with `,` thousands separators.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

pub fn render_row_counts(comparison: &RowCountComparison, base: &str, current: &str) -> String {
    let thin = "-".repeat(90);
    let mut out = String::new();

    out.push_str(&format!("Comparing: {base} vs {current}\n"));
    out.push('\n');
    out.push_str(&format!(
        "{:<40} {:>10} {:>10} {:>10} Result\n",
        "Table",
        "Base",
        "Current",
        "Diff",
    ));
    out.push_str(&format!("{thin}\n"));
    for row in &comparison.rows {
        let marker = match row.status {
            RowCountStatus::Match => "  ",
            RowCountStatus::Mismatch => "!!",
        };
        let diff = if row.diff >= 0 {
            format!("+{}", group_thousands(row.diff))
        } else {
            group_thousands(row.diff)
        };
        out.push_str(&format!(
            "{marker}{:<38} {:>10} {:>10} {:>10} {:+.1}% [{}]\n",
            row.table,
            group_thousands(row.base as i64),
            group_thousands(row.current as i64),
            diff,
            row.pct,
            row.status,
        ));
    }
    out.push_str(&format!("{thin}\n"));
    out.push_str(&format!(
        "Total tables: {}  |  Matches: {}  |  Mismatches: {}\n",
        comparison.rows.len(),
        comparison.matches,
        comparison.mismatches,
    ));
    out.push('\n');
    if comparison.is_clean() {
        out.push_str("Result: no false alarms, all row counts match.");
    } else {
        out.push_str(&format!(
            "Result: {} table(s) have row count differences.\n",
            comparison.mismatches,
        ));
        out.push_str("Each would surface as a potential false alarm in a PR review.");
    }
    out
}
