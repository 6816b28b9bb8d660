//! Compiled SQL diffing across two build targets.
//!
//! Both sides are loaded as [`SqlCorpus`] maps keyed the same way, normalized
//! with their own schema name, then line-diffed. Any residual difference is a
//! `non_deterministic` finding; keys present on one side only are structural
//! findings.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use walkdir::WalkDir;

use crate::error::{DriftError, Result};
use crate::manifest::Manifest;
use crate::normalize::SqlNormalizer;
use crate::obs;

const CONTEXT_LINES: usize = 3;

/// One compiled model inside a corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub model: String,
    pub path: String,
    /// Name used in unified diff headers.
    pub label: String,
    /// Empty when the corpus does not know the materialization.
    pub materialized: String,
    /// `None` when the entry has no compiled code.
    pub sql: Option<String>,
}

/// A keyed set of compiled SQL.
pub trait SqlCorpus {
    /// Short description of how entries were obtained.
    fn approach(&self) -> &'static str;

    fn load(&self) -> Result<BTreeMap<String, CorpusEntry>>;
}

/// Compiled `.sql` files under a directory, keyed by relative path.
#[derive(Debug, Clone)]
pub struct DirectoryCorpus {
    root: PathBuf,
    target: String,
}

impl DirectoryCorpus {
    /// `target` names the build target that produces the tree; it is only
    /// used in the error hint when the directory is missing.
    pub fn new(root: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            target: target.into(),
        }
    }
}

impl SqlCorpus for DirectoryCorpus {
    fn approach(&self) -> &'static str {
        "compiled file diff"
    }

    fn load(&self) -> Result<BTreeMap<String, CorpusEntry>> {
        if !self.root.is_dir() {
            return Err(DriftError::InputMissing {
                what: "compiled SQL directory",
                path: self.root.clone(),
                hint: format!(
                    "dbt compile --target {} && cp -r target/compiled {}",
                    self.target,
                    self.root.display()
                ),
            });
        }

        let mut entries = BTreeMap::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|source| DriftError::Walk {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension() != Some(OsStr::new("sql")) {
                continue;
            }
            let rel = path.strip_prefix(&self.root).unwrap_or(path);
            let key = rel.to_string_lossy().replace('\\', "/");
            let model = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| key.clone());
            let sql = std::fs::read_to_string(path)?;
            entries.insert(
                key.clone(),
                CorpusEntry {
                    model,
                    path: key.clone(),
                    label: key,
                    materialized: String::new(),
                    sql: Some(sql),
                },
            );
        }
        Ok(entries)
    }
}

/// Models of one project inside a compiled manifest, keyed by unique id.
#[derive(Debug, Clone)]
pub struct ManifestCorpus {
    manifest: Manifest,
    project: Option<String>,
}

impl ManifestCorpus {
    /// Scoped to the manifest's own project.
    pub fn new(manifest: Manifest) -> Self {
        let project = manifest.metadata.project_name.clone();
        Self { manifest, project }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(Self::new(Manifest::load(path)?))
    }

    /// Load both sides of a manifest diff. The current side is scoped to the
    /// base manifest's project so both select the same models.
    pub fn load_pair(base: &Path, current: &Path) -> Result<(Self, Self)> {
        let base = Self::load_from(base)?;
        let current = Self::load_from(current)?.scoped_to(base.project.clone());
        Ok((base, current))
    }

    pub fn scoped_to(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }
}

impl SqlCorpus for ManifestCorpus {
    fn approach(&self) -> &'static str {
        "manifest compiled_code diff"
    }

    fn load(&self) -> Result<BTreeMap<String, CorpusEntry>> {
        Ok(self
            .manifest
            .package_nodes("model", self.project.as_deref())
            .map(|(id, node)| {
                let name = node.name.clone().unwrap_or_else(|| id.clone());
                let entry = CorpusEntry {
                    model: name.clone(),
                    path: node.path.clone(),
                    label: name,
                    materialized: node
                        .config
                        .materialized
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    sql: node.compiled_code.clone().filter(|code| !code.is_empty()),
                };
                (id.clone(), entry)
            })
            .collect())
    }
}

/// Database and per-side schema names used for normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    pub db_name: String,
    pub base_schema: String,
    pub current_schema: String,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            db_name: "tpch".to_string(),
            base_schema: "base".to_string(),
            current_schema: "current".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    NonDeterministic,
    MissingInBase,
    MissingInCurrent,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffStatus::NonDeterministic => "non_deterministic",
            DiffStatus::MissingInBase => "missing_in_base",
            DiffStatus::MissingInCurrent => "missing_in_current",
        }
    }

    pub fn is_missing(&self) -> bool {
        !matches!(self, DiffStatus::NonDeterministic)
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model whose normalized SQL differs, or that exists on one side only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFinding {
    pub model: String,
    pub path: String,
    pub materialized: String,
    pub status: DiffStatus,
    /// Changed lines only, prefixed with `-` (base) or `+` (current).
    pub diff_lines: Vec<String>,
    /// Unified diff including headers and context.
    pub diff_full: Vec<String>,
}

impl DiffFinding {
    fn missing(entry: &CorpusEntry, status: DiffStatus) -> Self {
        Self {
            model: entry.model.clone(),
            path: entry.path.clone(),
            materialized: entry.materialized.clone(),
            status,
            diff_lines: Vec::new(),
            diff_full: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub compared: usize,
    pub non_deterministic: usize,
    pub missing_in_base: usize,
    pub missing_in_current: usize,
}

impl DiffSummary {
    pub fn missing(&self) -> usize {
        self.missing_in_base + self.missing_in_current
    }
}

/// Outcome of diffing two corpora.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    pub approach: String,
    pub findings: Vec<DiffFinding>,
    pub summary: DiffSummary,
}

impl DiffReport {
    pub fn non_deterministic(&self) -> impl Iterator<Item = &DiffFinding> {
        self.findings
            .iter()
            .filter(|f| f.status == DiffStatus::NonDeterministic)
    }

    pub fn missing(&self) -> impl Iterator<Item = &DiffFinding> {
        self.findings.iter().filter(|f| f.status.is_missing())
    }
}

/// Changed lines and full unified diff of two normalized texts.
pub fn line_diff(base: &str, current: &str, label: &str) -> (Vec<String>, Vec<String>) {
    let diff = TextDiff::from_lines(base, current);

    let changed = diff
        .iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => return None,
            };
            Some(format!(
                "{sign}{}",
                change.value().trim_end_matches(['\r', '\n'])
            ))
        })
        .collect();

    let full = diff
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .missing_newline_hint(false)
        .header(&format!("base/{label}"), &format!("current/{label}"))
        .to_string()
        .lines()
        .map(str::to_string)
        .collect();

    (changed, full)
}

/// Diff two loaded corpora.
pub fn diff_entries(
    base: &BTreeMap<String, CorpusEntry>,
    current: &BTreeMap<String, CorpusEntry>,
    options: &DiffOptions,
) -> (Vec<DiffFinding>, DiffSummary) {
    let base_normalizer = SqlNormalizer::new(&options.db_name, &options.base_schema);
    let current_normalizer = SqlNormalizer::new(&options.db_name, &options.current_schema);
    let mut findings = Vec::new();
    let mut summary = DiffSummary::default();

    for (key, base_entry) in base {
        let Some(current_entry) = current.get(key) else {
            findings.push(DiffFinding::missing(base_entry, DiffStatus::MissingInCurrent));
            summary.missing_in_current += 1;
            continue;
        };
        let (Some(base_sql), Some(current_sql)) = (&base_entry.sql, &current_entry.sql) else {
            continue;
        };
        summary.compared += 1;

        let base_norm = base_normalizer.normalize(base_sql);
        let current_norm = current_normalizer.normalize(current_sql);
        if base_norm == current_norm {
            continue;
        }

        let (diff_lines, diff_full) = line_diff(&base_norm, &current_norm, &base_entry.label);
        findings.push(DiffFinding {
            model: base_entry.model.clone(),
            path: base_entry.path.clone(),
            materialized: base_entry.materialized.clone(),
            status: DiffStatus::NonDeterministic,
            diff_lines,
            diff_full,
        });
        summary.non_deterministic += 1;
    }

    for (key, current_entry) in current {
        if !base.contains_key(key) {
            findings.push(DiffFinding::missing(current_entry, DiffStatus::MissingInBase));
            summary.missing_in_base += 1;
        }
    }

    (findings, summary)
}

/// Load both corpora and diff them.
pub fn diff_corpora(
    base: &dyn SqlCorpus,
    current: &dyn SqlCorpus,
    options: &DiffOptions,
) -> Result<DiffReport> {
    let base_entries = base.load()?;
    let current_entries = current.load()?;
    let (findings, summary) = diff_entries(&base_entries, &current_entries, options);
    let approach = base.approach().to_string();
    obs::emit_diff_completed(
        &approach,
        summary.compared,
        summary.non_deterministic,
        summary.missing(),
    );
    Ok(DiffReport {
        approach,
        findings,
        summary,
    })
}
