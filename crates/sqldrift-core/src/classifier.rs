//! Base-mode classification.
//!
//! Two layers: [`decide`] is the pure decision (recommendation and
//! confidence), driven only by the number of flagged models and event-time
//! coverage; [`explain`] builds the ordered, human-readable signal list. Only
//! pattern-scanner findings move the recommendation; every other signal is
//! context.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::manifest::{Materialization, MaterializationCounts, ProjectMetadata, SourceCoverage};
use crate::obs;
use crate::scanner::PatternFinding;
use crate::signal::{Direction, Signal, Weight};

/// Projects above this many models get the scale signal.
pub const LARGE_PROJECT_MODELS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    SharedBase,
    IsolatedBase,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::SharedBase => "shared_base",
            Recommendation::IsolatedBase => "isolated_base",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The binary outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub recommendation: Recommendation,
    pub confidence: Confidence,
}

/// Decide the base mode.
///
/// Any flagged model means `isolated_base`. Confidence is `high` when nothing
/// is flagged or every source has an event-time column, `medium` otherwise.
pub fn decide(flagged_models: usize, coverage: SourceCoverage) -> Decision {
    if flagged_models == 0 {
        return Decision {
            recommendation: Recommendation::SharedBase,
            confidence: Confidence::High,
        };
    }
    Decision {
        recommendation: Recommendation::IsolatedBase,
        confidence: if coverage.is_complete() {
            Confidence::High
        } else {
            Confidence::Medium
        },
    }
}

/// Everything the classifier reads.
#[derive(Debug, Clone, Default)]
pub struct ClassifierInput<'a> {
    pub materialization_counts: MaterializationCounts,
    pub total_models: usize,
    pub snapshot_count: usize,
    pub findings: &'a [PatternFinding],
    pub source_coverage: SourceCoverage,
    /// Names of incremental models, in name order.
    pub incremental_models: Vec<&'a str>,
    /// Names of table models, in name order.
    pub table_models: Vec<&'a str>,
}

impl<'a> ClassifierInput<'a> {
    pub fn from_project(project: &'a ProjectMetadata, findings: &'a [PatternFinding]) -> Self {
        let names_of = |kind: Materialization| {
            project
                .models
                .values()
                .filter(|m| m.materialization == kind)
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
        };
        Self {
            materialization_counts: project.materialization_counts,
            total_models: project.total_models(),
            snapshot_count: project.snapshots.len(),
            findings,
            source_coverage: project.source_coverage(),
            incremental_models: names_of(Materialization::Incremental),
            table_models: names_of(Materialization::Table),
        }
    }

    fn is_flagged(&self, name: &str) -> bool {
        self.findings.iter().any(|f| f.name == name)
    }

    fn unflagged<'s>(&'s self, names: &'s [&'a str]) -> Vec<&'a str> {
        names.iter().copied().filter(|n| !self.is_flagged(n)).collect()
    }
}

/// Flagged models per materialization bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalModels {
    pub total: usize,
    pub by_materialization: MaterializationCounts,
}

impl ConditionalModels {
    pub fn from_findings(findings: &[PatternFinding]) -> Self {
        let mut by_materialization = MaterializationCounts::default();
        for finding in findings {
            by_materialization.record(Materialization::parse(&finding.materialized));
        }
        Self {
            total: findings.len(),
            by_materialization,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub recommendation: Recommendation,
    pub confidence: Confidence,
    pub signals: Vec<Signal>,
    pub conditional_models: ConditionalModels,
}

/// Decide, then explain.
pub fn classify(input: &ClassifierInput<'_>) -> ClassificationResult {
    let decision = decide(input.findings.len(), input.source_coverage);
    let signals = explain(input, &decision);
    obs::emit_classification_decided(
        decision.recommendation.as_str(),
        decision.confidence.as_str(),
        signals.len(),
    );
    ClassificationResult {
        recommendation: decision.recommendation,
        confidence: decision.confidence,
        signals,
        conditional_models: ConditionalModels::from_findings(input.findings),
    }
}

/// Build the explanatory signal list, in rule order.
pub fn explain(input: &ClassifierInput<'_>, decision: &Decision) -> Vec<Signal> {
    let mut signals = Vec::new();
    signals.push(scan_signal(input));

    if decision.recommendation == Recommendation::IsolatedBase {
        let safe = input.unflagged(&input.incremental_models);
        if !safe.is_empty() {
            signals.push(Signal::new(
                "safe_incremental_models",
                safe.len(),
                format!(
                    "{} incremental model(s) not flagged: {}",
                    safe.len(),
                    safe.join(", ")
                ),
                Weight::Moderate,
                Direction::SharedBase,
                "Their conditional branches reference neither the build target nor the clock. \
                 They are not the cause of the recommendation.",
            ));
        }
    }

    if let Some(signal) = materialization_signal(input) {
        signals.push(signal);
    }
    if let Some(signal) = event_time_signal(input.source_coverage) {
        signals.push(signal);
    }

    if input.total_models > LARGE_PROJECT_MODELS {
        signals.push(Signal::new(
            "project_scale",
            input.total_models,
            format!(
                "{} models, large projects benefit more from isolation",
                input.total_models
            ),
            Weight::Weak,
            Direction::IsolatedBase,
            "Larger projects have more surface area for false alarms. \
             An isolated base reduces noise across all comparisons.",
        ));
    }

    signals
}

fn scan_signal(input: &ClassifierInput<'_>) -> Signal {
    if input.findings.is_empty() {
        let mut detail = "No model references the build target or the build clock".to_string();
        if input.snapshot_count > 0 {
            detail.push_str(&format!(
                " ({} snapshot(s) not scanned)",
                input.snapshot_count
            ));
        }
        return Signal::new(
            "non_deterministic_models",
            0,
            detail,
            Weight::Strong,
            Direction::SharedBase,
            "Every model compiles to the same SQL under any target, so base and current \
             produce the same data from the same input.",
        );
    }

    let listed: Vec<String> = input
        .findings
        .iter()
        .map(|f| format!("{} ({})", f.name, f.pattern_names().join(", ")))
        .collect();
    Signal::new(
        "non_deterministic_models",
        json!(input.findings.iter().map(|f| f.name.as_str()).collect::<Vec<_>>()),
        format!(
            "{} model(s) compile differently per build context: {}",
            input.findings.len(),
            listed.join("; ")
        ),
        Weight::Strong,
        Direction::IsolatedBase,
        "A shared base built under another target or at another time produces diffs \
         that no code change caused.",
    )
}

fn materialization_signal(input: &ClassifierInput<'_>) -> Option<Signal> {
    let counts = &input.materialization_counts;
    if input.total_models > 0 && counts.view == input.total_models && input.findings.is_empty() {
        return Some(Signal::new(
            "all_views",
            true,
            "All models are views, no materialized data to diverge",
            Weight::Moderate,
            Direction::SharedBase,
            "Views are recomputed on read; no stored state can diverge between environments.",
        ));
    }

    let unflagged_tables = input.unflagged(&input.table_models);
    if unflagged_tables.is_empty() {
        return None;
    }
    Some(Signal::new(
        "table_models",
        unflagged_tables.len(),
        format!(
            "{} table model(s) without flags, full refresh on each build",
            unflagged_tables.len()
        ),
        Weight::Weak,
        Direction::SharedBase,
        "Table models are rebuilt from scratch. With the same source data, \
         base and current produce identical results.",
    ))
}

fn event_time_signal(coverage: SourceCoverage) -> Option<Signal> {
    if coverage.total == 0 {
        return None;
    }
    let pct = coverage.percent();
    let signal = if coverage.is_complete() {
        Signal::new(
            "event_time_coverage",
            format!("{pct:.0}%"),
            format!("All {} sources have event_time configured", coverage.total),
            Weight::Moderate,
            Direction::EnablesIsolation,
            "Every source can be filtered to one time window, so isolated base builds \
             stay fast and deterministic.",
        )
    } else if coverage.with_event_time > 0 {
        Signal::new(
            "event_time_coverage",
            format!("{pct:.0}%"),
            format!(
                "{} of {} sources have event_time",
                coverage.with_event_time, coverage.total
            ),
            Weight::Weak,
            Direction::PartialIsolation,
            "Sampling only filters some sources. Sources without event_time still load \
             full data.",
        )
    } else {
        Signal::new(
            "event_time_coverage",
            "0%",
            "No sources have event_time configured",
            Weight::Moderate,
            Direction::BlocksSample,
            "Without event_time, sampling cannot be used. An isolated base would need \
             full rebuilds or another filter.",
        )
    };
    Some(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::PatternMatch;

    fn finding(name: &str, materialized: &str) -> PatternFinding {
        PatternFinding {
            name: name.to_string(),
            path: format!("models/{name}.sql"),
            materialized: materialized.to_string(),
            patterns: vec![PatternMatch {
                pattern: "target_name".to_string(),
                weight: Weight::Strong,
                reason: "compiled SQL differs per build target name".to_string(),
            }],
        }
    }

    fn coverage(total: usize, with_event_time: usize) -> SourceCoverage {
        SourceCoverage {
            total,
            with_event_time,
            without_event_time: total - with_event_time,
        }
    }

    fn keys(signals: &[Signal]) -> Vec<&str> {
        signals.iter().map(|s| s.signal.as_str()).collect()
    }

    #[test]
    fn test_decide_no_flags_is_shared_high() {
        let d = decide(0, coverage(3, 0));
        assert_eq!(d.recommendation, Recommendation::SharedBase);
        assert_eq!(d.confidence, Confidence::High);
    }

    #[test]
    fn test_decide_flags_with_full_coverage_is_high() {
        let d = decide(2, coverage(4, 4));
        assert_eq!(d.recommendation, Recommendation::IsolatedBase);
        assert_eq!(d.confidence, Confidence::High);
    }

    #[test]
    fn test_decide_flags_with_partial_or_no_sources_is_medium() {
        assert_eq!(decide(1, coverage(4, 3)).confidence, Confidence::Medium);
        assert_eq!(decide(1, coverage(0, 0)).confidence, Confidence::Medium);
    }

    #[test]
    fn test_monotonic_in_flagged_models() {
        for total in 0..4 {
            for with in 0..=total {
                let cov = coverage(total, with);
                for flagged in 1..6 {
                    let before = decide(flagged, cov);
                    let after = decide(flagged + 1, cov);
                    assert_eq!(before.recommendation, Recommendation::IsolatedBase);
                    assert_eq!(after.recommendation, Recommendation::IsolatedBase);
                    if before.confidence == Confidence::Medium {
                        assert_eq!(after.confidence, Confidence::Medium);
                    }
                }
                let clean = decide(0, cov);
                let one = decide(1, cov);
                assert_eq!(one.recommendation, Recommendation::IsolatedBase);
                if one.confidence == Confidence::High {
                    assert!(cov.is_complete());
                }
                assert_eq!(clean.confidence, Confidence::High);
            }
        }
    }

    #[test]
    fn test_clean_all_view_project() {
        let input = ClassifierInput {
            materialization_counts: MaterializationCounts {
                view: 3,
                ..Default::default()
            },
            total_models: 3,
            ..Default::default()
        };
        let result = classify(&input);
        assert_eq!(result.recommendation, Recommendation::SharedBase);
        assert_eq!(keys(&result.signals), vec!["non_deterministic_models", "all_views"]);
        assert_eq!(result.signals[0].direction, Direction::SharedBase);
        assert_eq!(result.signals[0].weight, Weight::Strong);
        assert_eq!(result.conditional_models.total, 0);
    }

    #[test]
    fn test_flagged_project_signal_order() {
        let findings = vec![finding("metrics_regional_revenue", "table")];
        let input = ClassifierInput {
            materialization_counts: MaterializationCounts {
                table: 2,
                incremental: 1,
                ..Default::default()
            },
            total_models: 3,
            findings: &findings,
            source_coverage: coverage(2, 1),
            incremental_models: vec!["metrics_daily_orders"],
            table_models: vec!["metrics_regional_revenue", "stg_orders"],
            ..Default::default()
        };
        let result = classify(&input);
        assert_eq!(result.recommendation, Recommendation::IsolatedBase);
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(
            keys(&result.signals),
            vec![
                "non_deterministic_models",
                "safe_incremental_models",
                "table_models",
                "event_time_coverage"
            ]
        );
        assert!(result.signals[0].detail.contains("metrics_regional_revenue (target_name)"));
        assert!(result.signals[1].detail.contains("metrics_daily_orders"));
        assert_eq!(result.signals[2].value, json!(1));
        assert_eq!(result.signals[3].direction, Direction::PartialIsolation);
        assert_eq!(result.signals[3].value, json!("50%"));
        assert_eq!(result.conditional_models.by_materialization.table, 1);
    }

    #[test]
    fn test_safe_incremental_signal_only_when_isolated() {
        let input = ClassifierInput {
            materialization_counts: MaterializationCounts {
                incremental: 1,
                ..Default::default()
            },
            total_models: 1,
            incremental_models: vec!["metrics_daily_orders"],
            ..Default::default()
        };
        let result = classify(&input);
        assert_eq!(keys(&result.signals), vec!["non_deterministic_models"]);
    }

    #[test]
    fn test_event_time_signals() {
        let full = event_time_signal(coverage(4, 4)).unwrap();
        assert_eq!(full.direction, Direction::EnablesIsolation);
        assert_eq!(full.weight, Weight::Moderate);
        assert_eq!(full.value, json!("100%"));

        let none = event_time_signal(coverage(3, 0)).unwrap();
        assert_eq!(none.direction, Direction::BlocksSample);
        assert_eq!(none.weight, Weight::Moderate);

        let partial = event_time_signal(coverage(3, 1)).unwrap();
        assert_eq!(partial.weight, Weight::Weak);
        assert_eq!(partial.value, json!("33%"));

        assert!(event_time_signal(coverage(0, 0)).is_none());
    }

    #[test]
    fn test_scale_signal_is_additive() {
        let input = ClassifierInput {
            materialization_counts: MaterializationCounts {
                view: 51,
                ..Default::default()
            },
            total_models: 51,
            ..Default::default()
        };
        let result = classify(&input);
        assert_eq!(result.recommendation, Recommendation::SharedBase);
        let last = result.signals.last().unwrap();
        assert_eq!(last.signal, "project_scale");
        assert_eq!(last.direction, Direction::IsolatedBase);
        assert_eq!(last.weight, Weight::Weak);
    }

    #[test]
    fn test_snapshot_count_mentioned_when_clean() {
        let input = ClassifierInput {
            snapshot_count: 2,
            ..Default::default()
        };
        let result = classify(&input);
        assert!(result.signals[0].detail.contains("2 snapshot(s) not scanned"));
    }
}
