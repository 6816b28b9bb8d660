//! Scoring a positive set against ground truth.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ground_truth::GroundTruth;

/// Score of one approach.
///
/// `accuracy` is `(true positives + safe models left unflagged) / total known
/// models * 100`. Name lists are sorted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApproachScore {
    /// Machine name of the approach.
    pub approach: String,
    /// Label used in reports.
    pub label: String,
    /// Every model the approach flagged.
    pub flagged: Vec<String>,
    pub true_positives: Vec<String>,
    pub false_negatives: Vec<String>,
    pub false_positives: Vec<String>,
    /// Negatives the approach correctly left unflagged.
    pub safe_correct: usize,
    pub accuracy: f64,
    /// The producer failed and was scored as flagging nothing.
    pub degraded: bool,
}

impl ApproachScore {
    pub fn tp(&self) -> usize {
        self.true_positives.len()
    }

    pub fn fn_count(&self) -> usize {
        self.false_negatives.len()
    }

    pub fn fp(&self) -> usize {
        self.false_positives.len()
    }

    /// Every positive caught and nothing else flagged.
    pub fn is_perfect(&self) -> bool {
        self.false_negatives.is_empty() && self.false_positives.is_empty()
    }
}

/// Score `flagged` against `truth`.
pub fn score(
    approach: &str,
    label: &str,
    flagged: &BTreeSet<String>,
    truth: &GroundTruth,
) -> ApproachScore {
    let sorted = |set: BTreeSet<&String>| set.into_iter().cloned().collect::<Vec<_>>();

    let true_positives = sorted(truth.positives.intersection(flagged).collect());
    let false_negatives = sorted(truth.positives.difference(flagged).collect());
    let false_positives = sorted(flagged.difference(&truth.positives).collect());
    let safe_correct = truth.negatives.difference(flagged).count();

    let total = truth.total();
    let accuracy = if total == 0 {
        0.0
    } else {
        (true_positives.len() + safe_correct) as f64 / total as f64 * 100.0
    };

    ApproachScore {
        approach: approach.to_string(),
        label: label.to_string(),
        flagged: flagged.iter().cloned().collect(),
        true_positives,
        false_negatives,
        false_positives,
        safe_correct,
        accuracy,
        degraded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_perfect_score() {
        let truth = GroundTruth::default();
        let flagged = truth.positives.clone();
        let s = score("pattern_scan", "Scan", &flagged, &truth);
        assert_eq!(s.tp(), 4);
        assert_eq!(s.safe_correct, 1);
        assert_eq!(s.accuracy, 100.0);
        assert!(s.is_perfect());
    }

    #[test]
    fn test_missed_positive() {
        let truth = GroundTruth::default();
        let flagged = set(&[
            "metrics_shipping_efficiency",
            "metrics_regional_revenue",
            "metrics_order_summary",
        ]);
        let s = score("compiled_diff_existing", "Diff", &flagged, &truth);
        assert_eq!(s.false_negatives, vec!["metrics_daily_shipments"]);
        assert_eq!(s.accuracy, 80.0);
        assert!(!s.is_perfect());
    }

    #[test]
    fn test_false_positive_and_flagged_negative() {
        let truth = GroundTruth::new(["a"], ["b"]);
        let s = score("x", "X", &set(&["a", "b", "zz"]), &truth);
        assert_eq!(s.false_positives, vec!["b", "zz"]);
        assert_eq!(s.safe_correct, 0);
        assert_eq!(s.accuracy, 50.0);
    }

    #[test]
    fn test_empty_set_scores_only_negatives() {
        let s = score("x", "X", &BTreeSet::new(), &GroundTruth::default());
        assert_eq!(s.tp(), 0);
        assert_eq!(s.fn_count(), 4);
        assert_eq!(s.accuracy, 20.0);
    }

    #[test]
    fn test_empty_truth() {
        let truth = GroundTruth::new(Vec::<String>::new(), Vec::<String>::new());
        assert_eq!(score("x", "X", &set(&["a"]), &truth).accuracy, 0.0);
    }
}
