//! Row-count comparison between two environments.
//!
//! Counts come from any [`RowCountSource`]; the comparison itself is pure.
//! Tables present on one side only count as zero on the other.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DriftError, Result};

/// Provides `relation -> row count` for one environment.
pub trait RowCountSource {
    fn row_counts(&self) -> Result<BTreeMap<String, u64>>;
}

impl RowCountSource for BTreeMap<String, u64> {
    fn row_counts(&self) -> Result<BTreeMap<String, u64>> {
        Ok(self.clone())
    }
}

/// A JSON object mapping relation names to counts, e.g. `{"orders": 1500}`.
#[derive(Debug, Clone)]
pub struct JsonCountsFile {
    path: PathBuf,
}

impl JsonCountsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RowCountSource for JsonCountsFile {
    fn row_counts(&self) -> Result<BTreeMap<String, u64>> {
        if !self.path.exists() {
            return Err(DriftError::InputMissing {
                what: "row count file",
                path: self.path.clone(),
                hint: "export `select count(*)` per relation as a JSON object".to_string(),
            });
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowCountStatus {
    Match,
    Mismatch,
}

impl fmt::Display for RowCountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowCountStatus::Match => f.write_str("match"),
            RowCountStatus::Mismatch => f.write_str("MISMATCH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCountRow {
    pub table: String,
    pub base: u64,
    pub current: u64,
    pub diff: i64,
    /// Percent change relative to base; `100.0` when base is empty but
    /// current is not.
    pub pct: f64,
    pub status: RowCountStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowCountComparison {
    pub rows: Vec<RowCountRow>,
    pub matches: usize,
    pub mismatches: usize,
}

impl RowCountComparison {
    pub fn is_clean(&self) -> bool {
        self.mismatches == 0
    }
}

fn percent_change(base: u64, current: u64, diff: i64) -> f64 {
    if base > 0 {
        diff as f64 / base as f64 * 100.0
    } else if current > 0 {
        100.0
    } else {
        0.0
    }
}

/// Compare two count maps over the union of their relations, in name order.
pub fn compare_row_counts(
    base: &BTreeMap<String, u64>,
    current: &BTreeMap<String, u64>,
) -> RowCountComparison {
    let tables: BTreeSet<&String> = base.keys().chain(current.keys()).collect();
    let mut comparison = RowCountComparison::default();

    for table in tables {
        let base_n = base.get(table).copied().unwrap_or(0);
        let current_n = current.get(table).copied().unwrap_or(0);
        let diff = current_n as i64 - base_n as i64;
        let status = if diff == 0 {
            comparison.matches += 1;
            RowCountStatus::Match
        } else {
            comparison.mismatches += 1;
            RowCountStatus::Mismatch
        };
        comparison.rows.push(RowCountRow {
            table: table.clone(),
            base: base_n,
            current: current_n,
            diff,
            pct: percent_change(base_n, current_n, diff),
            status,
        });
    }
    comparison
}

/// Load both sides and compare them.
pub fn compare_sources(
    base: &dyn RowCountSource,
    current: &dyn RowCountSource,
) -> Result<RowCountComparison> {
    Ok(compare_row_counts(&base.row_counts()?, &current.row_counts()?))
}
