//! Serial comparison of detection approaches.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use sqldrift_core::obs;
use tracing::info;

use crate::ground_truth::GroundTruth;
use crate::producer::PositiveSetProducer;
use crate::scoring::{score, ApproachScore};

/// Result of one harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessResult {
    pub ground_truth: GroundTruth,

    /// Scores in producer order.
    pub scores: Vec<ApproachScore>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl HarnessResult {
    /// Number of approaches that failed and were scored as empty.
    pub fn degraded_count(&self) -> usize {
        self.scores.iter().filter(|s| s.degraded).count()
    }

    pub fn score(&self, approach: &str) -> Option<&ApproachScore> {
        self.scores.iter().find(|s| s.approach == approach)
    }
}

/// Runs producers one after another and scores each.
pub struct ComparisonHarness;

impl ComparisonHarness {
    /// A failing producer never aborts the run: it is reported on stderr and
    /// scored as an empty positive set.
    pub async fn run(
        producers: &[Box<dyn PositiveSetProducer>],
        truth: &GroundTruth,
    ) -> HarnessResult {
        let start = Instant::now();
        let mut scores = Vec::with_capacity(producers.len());

        for producer in producers {
            info!(approach = %producer.name(), "Running approach");

            let (flagged, degraded) = match producer.produce().await {
                Ok(set) => (set, false),
                Err(e) => {
                    eprintln!("Error running {}: {e:#}", producer.label());
                    obs::emit_producer_degraded(producer.name(), &e);
                    (Default::default(), true)
                }
            };

            let mut approach_score = score(producer.name(), producer.label(), &flagged, truth);
            approach_score.degraded = degraded;
            obs::emit_approach_scored(
                &approach_score.approach,
                approach_score.tp(),
                approach_score.fp(),
                approach_score.accuracy,
            );
            scores.push(approach_score);
        }

        HarnessResult {
            ground_truth: truth.clone(),
            scores,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

fn names_suffix(names: &[String]) -> String {
    if names.is_empty() {
        String::new()
    } else {
        format!(" [{}]", names.join(", "))
    }
}

/// Human-readable comparison report.
pub fn render_comparison(result: &HarnessResult) -> String {
    let rule = "=".repeat(70);
    let thin = "-".repeat(70);
    let truth = &result.ground_truth;
    let mut out = String::new();

    out.push_str(&format!("{rule}\n  Detection Approach Comparison\n{rule}\n\n"));
    out.push_str("  Ground truth (should be flagged):\n");
    for name in &truth.positives {
        out.push_str(&format!("    - {name}\n"));
    }
    out.push_str("\n  Safe models (should NOT be flagged):\n");
    for name in &truth.negatives {
        out.push_str(&format!("    - {name}\n"));
    }
    out.push('\n');

    for (i, s) in result.scores.iter().enumerate() {
        out.push_str(&format!("{thin}\n"));
        out.push_str(&format!("  Approach {}: {}\n", i + 1, s.label));
        if s.degraded {
            out.push_str("  (failed, scored as flagging nothing)\n");
        }
        out.push_str(&format!("  Flagged: [{}]\n", s.flagged.join(", ")));
        out.push_str(&format!(
            "  True positives:  {}/{}\n",
            s.tp(),
            truth.positives.len()
        ));
        out.push_str(&format!(
            "  False negatives: {}{}\n",
            s.fn_count(),
            names_suffix(&s.false_negatives)
        ));
        out.push_str(&format!(
            "  False positives: {}{}\n",
            s.fp(),
            names_suffix(&s.false_positives)
        ));
        out.push_str(&format!(
            "  Safe correctly:  {}/{}\n\n",
            s.safe_correct,
            truth.negatives.len()
        ));
    }

    out.push_str(&format!("{rule}\n  Summary\n{rule}\n\n"));
    out.push_str(&format!(
        "  {:<50} {:>4} {:>4} {:>4} Accuracy\n",
        "Approach", "TP", "FN", "FP"
    ));
    out.push_str(&format!(
        "  {} {:>4} {:>4} {:>4} --------\n",
        "-".repeat(50),
        "--",
        "--",
        "--"
    ));
    for s in &result.scores {
        out.push_str(&format!(
            "  {:<50} {:>4} {:>4} {:>4} {:>6.1}%\n",
            s.label,
            s.tp(),
            s.fn_count(),
            s.fp(),
            s.accuracy
        ));
    }
    out
}
