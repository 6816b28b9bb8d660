//! Detection approach definitions and configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqldrift_core::DiffOptions;

/// Builtin detection approaches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinApproach {
    /// sqldrift detect --json
    PatternScan,

    /// sqldrift diff over trees compiled against existing tables
    CompiledDiffExisting,

    /// sqldrift diff over trees compiled with --full-refresh
    CompiledDiffFullRefresh,
}

impl BuiltinApproach {
    pub const ALL: [BuiltinApproach; 3] = [
        BuiltinApproach::PatternScan,
        BuiltinApproach::CompiledDiffExisting,
        BuiltinApproach::CompiledDiffFullRefresh,
    ];

    /// Get the approach name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinApproach::PatternScan => "pattern_scan",
            BuiltinApproach::CompiledDiffExisting => "compiled_diff_existing",
            BuiltinApproach::CompiledDiffFullRefresh => "compiled_diff_full_refresh",
        }
    }

    /// Human-readable label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            BuiltinApproach::PatternScan => "Template Pattern Scanning",
            BuiltinApproach::CompiledDiffExisting => "Compiled SQL Diff (existing tables)",
            BuiltinApproach::CompiledDiffFullRefresh => "Compiled SQL Diff (--full-refresh)",
        }
    }

    /// Arguments passed to the `sqldrift` binary for this approach.
    pub fn args(&self, inputs: &ApproachInputs) -> Vec<String> {
        match self {
            BuiltinApproach::PatternScan => vec![
                "detect".to_string(),
                "--manifest".to_string(),
                path_arg(&inputs.manifest),
                "--json".to_string(),
            ],
            BuiltinApproach::CompiledDiffExisting => {
                diff_args(&inputs.base_dir, &inputs.current_dir, &inputs.diff)
            }
            BuiltinApproach::CompiledDiffFullRefresh => diff_args(
                &inputs.base_dir_full_refresh,
                &inputs.current_dir_full_refresh,
                &inputs.diff,
            ),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn diff_args(base: &Path, current: &Path, diff: &DiffOptions) -> Vec<String> {
    vec![
        "diff".to_string(),
        "--base-dir".to_string(),
        path_arg(base),
        "--current-dir".to_string(),
        path_arg(current),
        "--db-name".to_string(),
        diff.db_name.clone(),
        "--base-schema".to_string(),
        diff.base_schema.clone(),
        "--current-schema".to_string(),
        diff.current_schema.clone(),
        "--json".to_string(),
    ]
}

/// Artifacts the three approaches read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproachInputs {
    pub manifest: PathBuf,
    pub base_dir: PathBuf,
    pub current_dir: PathBuf,
    pub base_dir_full_refresh: PathBuf,
    pub current_dir_full_refresh: PathBuf,
    pub diff: DiffOptions,
}

impl Default for ApproachInputs {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("target/manifest.json"),
            base_dir: PathBuf::from("target/compiled_pg_base"),
            current_dir: PathBuf::from("target/compiled_pg_current"),
            base_dir_full_refresh: PathBuf::from("target/compiled_pg_base_fr"),
            current_dir_full_refresh: PathBuf::from("target/compiled_pg_current_fr"),
            diff: DiffOptions::default(),
        }
    }
}

impl ApproachInputs {
    /// Layout of a checked-in fixture project rooted at `root`.
    pub fn fixture(root: &Path) -> Self {
        Self {
            manifest: root.join("manifest.json"),
            base_dir: root.join("compiled_base"),
            current_dir: root.join("compiled_current"),
            base_dir_full_refresh: root.join("compiled_base_fr"),
            current_dir_full_refresh: root.join("compiled_current_fr"),
            diff: DiffOptions::default(),
        }
    }
}

/// Configuration for running one approach as a subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproachConfig {
    /// Machine name of the approach.
    pub name: String,

    /// Label used in reports.
    pub label: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,
}

impl ApproachConfig {
    /// Configure a builtin approach run through the `sqldrift` binary at `exe`.
    pub fn from_builtin(approach: BuiltinApproach, exe: &Path, inputs: &ApproachInputs) -> Self {
        let mut command = vec![path_arg(exe)];
        command.extend(approach.args(inputs));
        Self {
            name: approach.name().to_string(),
            label: approach.label().to_string(),
            command,
        }
    }

    /// Create a custom approach configuration.
    pub fn custom(name: String, label: String, command: Vec<String>) -> Self {
        Self {
            name,
            label,
            command,
        }
    }
}
