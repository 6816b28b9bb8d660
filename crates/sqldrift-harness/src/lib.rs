//! sqldrift Harness - cross-validation of detection approaches
//!
//! Provides a comparison harness that:
//! - Runs each detection approach (in process or as a `sqldrift` subprocess)
//! - Scores its positive set against ground truth
//! - Degrades failing approaches to an empty set instead of aborting

pub mod approach;
pub mod ground_truth;
pub mod harness;
pub mod producer;
pub mod runner;
pub mod scoring;

// Re-export key types
pub use approach::{ApproachConfig, ApproachInputs, BuiltinApproach};
pub use ground_truth::GroundTruth;
pub use harness::{render_comparison, ComparisonHarness, HarnessResult};
pub use producer::{
    in_process_producers, parse_positive_set, subprocess_producers, DiffProducer,
    PositiveSetProducer, ProducerError, ScanProducer, SubprocessProducer,
};
pub use runner::{ApproachRunner, RunOutput};
pub use scoring::{score, ApproachScore};
