//! Expected classification of the fixture project's models.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Models known to be non-deterministic (`positives`) and known to be safe
/// (`negatives`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub positives: BTreeSet<String>,
    pub negatives: BTreeSet<String>,
}

impl Default for GroundTruth {
    /// The `tpch_metrics` fixture: four models reference `target.name`; the
    /// incremental daily-orders model has a deterministic full-build branch.
    fn default() -> Self {
        Self::new(
            [
                "metrics_daily_shipments",
                "metrics_shipping_efficiency",
                "metrics_regional_revenue",
                "metrics_order_summary",
            ],
            ["metrics_daily_orders"],
        )
    }
}

impl GroundTruth {
    pub fn new<P, N>(positives: P, negatives: N) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        Self {
            positives: positives.into_iter().map(Into::into).collect(),
            negatives: negatives.into_iter().map(Into::into).collect(),
        }
    }

    /// Read `{"positives": [...], "negatives": [...]}` from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ground truth {}", path.display()))?;
        let truth: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse ground truth {}", path.display()))?;
        if let Some(both) = truth.positives.intersection(&truth.negatives).next() {
            anyhow::bail!("model {both} is listed as both positive and negative");
        }
        Ok(truth)
    }

    /// Number of models with a known answer.
    pub fn total(&self) -> usize {
        self.positives.len() + self.negatives.len()
    }
}
