//! Positive-set producers: anything that names the models it considers
//! non-deterministic.

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqldrift_core::{
    diff_corpora, DetectReport, DiffOptions, DirectoryCorpus, Manifest, PatternScanner,
};

use crate::approach::{ApproachConfig, ApproachInputs, BuiltinApproach};
use crate::runner::ApproachRunner;

/// Why a producer could not deliver a positive set.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("{approach} exited with code {exit_code}: {stderr}")]
    NonZeroExit {
        approach: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{approach} produced unrecognised output: {reason}")]
    MalformedOutput { approach: String, reason: String },
}

#[async_trait]
pub trait PositiveSetProducer: Send + Sync {
    /// Machine name of the approach.
    fn name(&self) -> &str;

    /// Label used in reports.
    fn label(&self) -> &str;

    async fn produce(&self) -> anyhow::Result<BTreeSet<String>>;
}

/// Extract flagged model names from `detect --json` or `diff --json` output.
///
/// Detect output lists `sql_findings[].name`; diff output lists
/// `non_deterministic[].model`.
pub fn parse_positive_set(approach: &str, stdout: &str) -> Result<BTreeSet<String>, ProducerError> {
    let malformed = |reason: String| ProducerError::MalformedOutput {
        approach: approach.to_string(),
        reason,
    };
    let value: Value = serde_json::from_str(stdout).map_err(|e| malformed(e.to_string()))?;

    let (items, field) = if let Some(items) = value.get("sql_findings") {
        (items, "name")
    } else if let Some(items) = value.get("non_deterministic") {
        (items, "model")
    } else {
        return Err(malformed(
            "expected `sql_findings` or `non_deterministic`".to_string(),
        ));
    };

    let items = items
        .as_array()
        .ok_or_else(|| malformed(format!("`{field}` list is not an array")))?;
    items
        .iter()
        .map(|item| {
            item.get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| malformed(format!("entry without string `{field}`")))
        })
        .collect()
}

/// Runs an approach through the `sqldrift` binary and parses its JSON output.
pub struct SubprocessProducer {
    config: ApproachConfig,
}

impl SubprocessProducer {
    pub fn new(config: ApproachConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PositiveSetProducer for SubprocessProducer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn label(&self) -> &str {
        &self.config.label
    }

    async fn produce(&self) -> anyhow::Result<BTreeSet<String>> {
        let output = ApproachRunner::execute(&self.config).await?;
        if !output.passed() {
            return Err(ProducerError::NonZeroExit {
                approach: self.config.name.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(parse_positive_set(&self.config.name, &output.stdout)?)
    }
}

/// Pattern scanning against a manifest, in process.
pub struct ScanProducer {
    manifest: PathBuf,
    scanner: PatternScanner,
}

impl ScanProducer {
    pub fn new(manifest: PathBuf, scanner: PatternScanner) -> Self {
        Self { manifest, scanner }
    }
}

#[async_trait]
impl PositiveSetProducer for ScanProducer {
    fn name(&self) -> &str {
        BuiltinApproach::PatternScan.name()
    }

    fn label(&self) -> &str {
        BuiltinApproach::PatternScan.label()
    }

    async fn produce(&self) -> anyhow::Result<BTreeSet<String>> {
        let manifest = Manifest::load(&self.manifest)?;
        let report = DetectReport::analyze(&manifest, &self.scanner);
        Ok(report.flagged_models().into_iter().map(str::to_string).collect())
    }
}

/// Compiled directory diff, in process.
pub struct DiffProducer {
    approach: BuiltinApproach,
    base: DirectoryCorpus,
    current: DirectoryCorpus,
    options: DiffOptions,
}

impl DiffProducer {
    pub fn new(
        approach: BuiltinApproach,
        base: DirectoryCorpus,
        current: DirectoryCorpus,
        options: DiffOptions,
    ) -> Self {
        Self {
            approach,
            base,
            current,
            options,
        }
    }
}

#[async_trait]
impl PositiveSetProducer for DiffProducer {
    fn name(&self) -> &str {
        self.approach.name()
    }

    fn label(&self) -> &str {
        self.approach.label()
    }

    async fn produce(&self) -> anyhow::Result<BTreeSet<String>> {
        let report = diff_corpora(&self.base, &self.current, &self.options)?;
        Ok(report.non_deterministic().map(|f| f.model.clone()).collect())
    }
}

/// The three builtin approaches, each spawning `exe`.
pub fn subprocess_producers(
    exe: &std::path::Path,
    inputs: &ApproachInputs,
) -> Vec<Box<dyn PositiveSetProducer>> {
    BuiltinApproach::ALL
        .iter()
        .map(|approach| {
            Box::new(SubprocessProducer::new(ApproachConfig::from_builtin(
                *approach, exe, inputs,
            ))) as Box<dyn PositiveSetProducer>
        })
        .collect()
}

/// The three builtin approaches, run in process.
pub fn in_process_producers(inputs: &ApproachInputs) -> Vec<Box<dyn PositiveSetProducer>> {
    vec![
        Box::new(ScanProducer::new(
            inputs.manifest.clone(),
            PatternScanner::default(),
        )),
        Box::new(DiffProducer::new(
            BuiltinApproach::CompiledDiffExisting,
            DirectoryCorpus::new(&inputs.base_dir, "pg-base"),
            DirectoryCorpus::new(&inputs.current_dir, "pg-current"),
            inputs.diff.clone(),
        )),
        Box::new(DiffProducer::new(
            BuiltinApproach::CompiledDiffFullRefresh,
            DirectoryCorpus::new(&inputs.base_dir_full_refresh, "pg-base --full-refresh"),
            DirectoryCorpus::new(&inputs.current_dir_full_refresh, "pg-current --full-refresh"),
            inputs.diff.clone(),
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detect_output() {
        let stdout = r#"{"models": {}, "sql_findings": [{"name": "b"}, {"name": "a"}]}"#;
        let set = parse_positive_set("pattern_scan", stdout).unwrap();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_diff_output() {
        let stdout = r#"{"approach": "x", "non_deterministic": [{"model": "m"}], "missing": []}"#;
        let set = parse_positive_set("diff", stdout).unwrap();
        assert!(set.contains("m"));
    }

    #[test]
    fn test_parse_malformed_output() {
        for stdout in ["not json", r#"{"other": []}"#, r#"{"sql_findings": [{"nom": 1}]}"#] {
            let err = parse_positive_set("x", stdout).unwrap_err();
            assert!(matches!(err, ProducerError::MalformedOutput { .. }), "{stdout}");
        }
    }

    #[tokio::test]
    async fn test_subprocess_producer_non_zero_exit() {
        let producer = SubprocessProducer::new(ApproachConfig::custom(
            "failing".to_string(),
            "Failing".to_string(),
            vec!["false".to_string()],
        ));
        let err = producer.produce().await.unwrap_err();
        assert!(err.to_string().contains("failing exited with code"));
    }

    #[tokio::test]
    async fn test_subprocess_producer_parses_stdout() {
        let producer = SubprocessProducer::new(ApproachConfig::custom(
            "echo".to_string(),
            "Echo".to_string(),
            vec![
                "echo".to_string(),
                r#"{"non_deterministic": [{"model": "metrics_order_summary"}]}"#.to_string(),
            ],
        ));
        let set = producer.produce().await.unwrap();
        assert!(set.contains("metrics_order_summary"));
    }

    #[tokio::test]
    async fn test_scan_producer_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let producer =
            ScanProducer::new(dir.path().join("manifest.json"), PatternScanner::default());
        let err = producer.produce().await.unwrap_err();
        assert!(err.to_string().contains("manifest not found"));
    }
}
