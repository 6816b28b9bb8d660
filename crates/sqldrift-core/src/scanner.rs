//! Raw template scanning for build-context-dependent constructs.
//!
//! Each model's un-compiled source is stripped of comments and tested against
//! an ordered [`SignatureTable`]. The table is a value, so tightening or
//! widening what counts as non-deterministic never touches aggregation logic.
//!
//! Conditional-materialization markers (`is_incremental()`) and self
//! references (`{{ this }}`) are not signatures in the current table: in a
//! from-scratch build they take the safe branch, and they only cause
//! non-determinism together with a target or clock reference, which is
//! flagged on its own.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::manifest::{ModelRecord, ProjectMetadata};
use crate::normalize::strip_sql_comments;
use crate::obs;
use crate::signal::Weight;

static TEMPLATE_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{#.*?#\}").unwrap());

static TARGET_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\btarget\s*(?:\.\s*name\b|\[\s*['"]name['"]\s*\])"#).unwrap()
});

static TARGET_SCHEMA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\btarget\s*(?:\.\s*schema\b|\[\s*['"]schema['"]\s*\])"#).unwrap()
});

static BUILD_CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:current_date|current_time|current_timestamp|localtime|localtimestamp",
        r"|sysdate|systimestamp|run_started_at)\b",
        r"|\b(?:now|utcnow|getdate|sysdatetime|clock_timestamp|transaction_timestamp",
        r"|statement_timestamp)\s*\(",
    ))
    .unwrap()
});

static IS_INCREMENTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bis_incremental\s*\(\s*\)").unwrap());

static THIS_REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{-?\s*this\s*-?\}\}").unwrap());

/// Remove template (`{# #}`), block and line comments from raw source.
pub fn strip_template_comments(source: &str) -> String {
    let without_template = TEMPLATE_COMMENT_RE.replace_all(source, "");
    strip_sql_comments(&without_template)
}

/// A named construct known to make compiled SQL depend on build context.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: &'static str,
    pub matcher: Regex,
    pub weight: Weight,
    pub reason: &'static str,
}

/// Ordered, versioned list of signatures.
#[derive(Debug, Clone)]
pub struct SignatureTable {
    pub version: u32,
    signatures: Vec<Signature>,
}

impl SignatureTable {
    pub fn new(version: u32, signatures: Vec<Signature>) -> Self {
        Self {
            version,
            signatures,
        }
    }

    /// Flags only constructs that provably vary with the build context.
    pub fn current() -> Self {
        Self::new(
            2,
            vec![
                Signature {
                    name: "target_name",
                    matcher: TARGET_NAME_RE.clone(),
                    weight: Weight::Strong,
                    reason: "compiled SQL differs per build target name",
                },
                Signature {
                    name: "target_schema",
                    matcher: TARGET_SCHEMA_RE.clone(),
                    weight: Weight::Strong,
                    reason: "compiled SQL differs per build target schema",
                },
                Signature {
                    name: "build_time_clock",
                    matcher: BUILD_CLOCK_RE.clone(),
                    weight: Weight::Moderate,
                    reason: "result depends on the wall-clock time of the build",
                },
            ],
        )
    }

    /// First-generation table that flags every conditional-materialization
    /// model. Over-reports models whose else branch is deterministic.
    pub fn materialization_proxy() -> Self {
        Self::new(
            1,
            vec![
                Signature {
                    name: "conditional_materialization",
                    matcher: IS_INCREMENTAL_RE.clone(),
                    weight: Weight::Strong,
                    reason: "compiled SQL depends on whether the model's table already exists",
                },
                Signature {
                    name: "self_reference",
                    matcher: THIS_REFERENCE_RE.clone(),
                    weight: Weight::Moderate,
                    reason: "reads the model's own stored data",
                },
            ],
        )
    }

    /// Signatures matching `source`, in table order. Comments are ignored.
    pub fn matches(&self, source: &str) -> Vec<PatternMatch> {
        let cleaned = strip_template_comments(source);
        self.signatures
            .iter()
            .filter(|sig| sig.matcher.is_match(&cleaned))
            .map(|sig| PatternMatch {
                pattern: sig.name.to_string(),
                weight: sig.weight,
                reason: sig.reason.to_string(),
            })
            .collect()
    }
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self::current()
    }
}

/// One signature hit inside a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: String,
    pub weight: Weight,
    pub reason: String,
}

/// All signature hits for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternFinding {
    pub name: String,
    pub path: String,
    pub materialized: String,
    pub patterns: Vec<PatternMatch>,
}

impl PatternFinding {
    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.pattern.as_str()).collect()
    }

    /// Heaviest weight among the matched patterns.
    pub fn max_weight(&self) -> Option<Weight> {
        self.patterns.iter().map(|p| p.weight).max()
    }
}

/// Scans models against a signature table.
#[derive(Debug, Clone, Default)]
pub struct PatternScanner {
    table: SignatureTable,
}

impl PatternScanner {
    pub fn new(table: SignatureTable) -> Self {
        Self { table }
    }

    /// `None` when no signature matches.
    pub fn scan_model(&self, model: &ModelRecord) -> Option<PatternFinding> {
        let patterns = self.table.matches(&model.raw_code);
        if patterns.is_empty() {
            return None;
        }
        Some(PatternFinding {
            name: model.name.clone(),
            path: model.path.clone(),
            materialized: model.materialized.clone(),
            patterns,
        })
    }

    /// Scan every model in name order.
    pub fn scan(&self, project: &ProjectMetadata) -> Vec<PatternFinding> {
        let findings: Vec<PatternFinding> = project
            .models
            .values()
            .filter_map(|model| self.scan_model(model))
            .collect();
        obs::emit_scan_completed(self.table.version, project.total_models(), findings.len());
        findings
    }
}
