//! sqldrift - non-deterministic model detection CLI
//!
//! The `sqldrift` command finds models whose compiled SQL depends on the build
//! context and recommends a base mode for PR comparisons.
//!
//! ## Commands
//!
//! - `detect`: Scan raw templates in a manifest and classify the project
//! - `diff`: Diff SQL compiled under two targets
//! - `compare`: Score every detection approach against ground truth
//! - `row-counts`: Compare per-relation row counts of two environments

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{debug, Level};

use sqldrift_core::{
    compare_sources, diff_corpora, render_detect, render_diff, render_row_counts, AnalysisSpan,
    DetectReport, DiffOptions, DiffOutput, DirectoryCorpus, JsonCountsFile, Manifest,
    ManifestCorpus, PatternScanner, SignatureTable,
};
use sqldrift_harness::{
    in_process_producers, render_comparison, subprocess_producers, ApproachInputs,
    ComparisonHarness, GroundTruth,
};

#[derive(Parser)]
#[command(name = "sqldrift")]
#[command(version = sqldrift_core::VERSION)]
#[command(about = "Detect models whose compiled SQL depends on the build context", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan raw templates and recommend a base mode
    Detect {
        /// Path to the project manifest
        #[arg(long, env = "SQLDRIFT_MANIFEST", default_value = "target/manifest.json")]
        manifest: PathBuf,

        /// Signature table used by the scanner
        #[arg(long, value_enum, default_value_t = TableChoice::Current)]
        signatures: TableChoice,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Diff SQL compiled under two targets
    Diff {
        /// Directory with SQL compiled for the base target
        #[arg(long, env = "SQLDRIFT_BASE_DIR", default_value = "target/compiled_pg_base")]
        base_dir: PathBuf,

        /// Directory with SQL compiled for the current target
        #[arg(
            long,
            env = "SQLDRIFT_CURRENT_DIR",
            default_value = "target/compiled_pg_current"
        )]
        current_dir: PathBuf,

        /// Diff `compiled_code` of two manifests instead of directories
        #[arg(long)]
        use_manifest: bool,

        /// Base manifest (with --use-manifest)
        #[arg(
            long,
            env = "SQLDRIFT_BASE_MANIFEST",
            default_value = "target_base/manifest.json"
        )]
        base_manifest: PathBuf,

        /// Current manifest (with --use-manifest)
        #[arg(
            long,
            env = "SQLDRIFT_CURRENT_MANIFEST",
            default_value = "target_current/manifest.json"
        )]
        current_manifest: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every detection approach and score it against ground truth
    Compare {
        /// Take every input from a fixture project directory
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Path to the project manifest
        #[arg(long, env = "SQLDRIFT_MANIFEST", default_value = "target/manifest.json")]
        manifest: PathBuf,

        /// Base tree compiled against existing tables
        #[arg(long, env = "SQLDRIFT_BASE_DIR", default_value = "target/compiled_pg_base")]
        base_dir: PathBuf,

        /// Current tree compiled against existing tables
        #[arg(
            long,
            env = "SQLDRIFT_CURRENT_DIR",
            default_value = "target/compiled_pg_current"
        )]
        current_dir: PathBuf,

        /// Base tree compiled with --full-refresh
        #[arg(long, default_value = "target/compiled_pg_base_fr")]
        base_dir_full_refresh: PathBuf,

        /// Current tree compiled with --full-refresh
        #[arg(long, default_value = "target/compiled_pg_current_fr")]
        current_dir_full_refresh: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// JSON file with `positives` and `negatives` model lists
        #[arg(long, env = "SQLDRIFT_GROUND_TRUTH")]
        ground_truth: Option<PathBuf>,

        /// Run approaches in this process instead of spawning `sqldrift`
        #[arg(long)]
        in_process: bool,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare per-relation row counts of two environments
    RowCounts {
        /// JSON object of relation -> count for the base environment
        #[arg(long)]
        base: PathBuf,

        /// JSON object of relation -> count for the current environment
        #[arg(long)]
        current: PathBuf,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

/// Database and schema names used to normalize compiled SQL.
#[derive(Args, Clone)]
struct TargetArgs {
    /// Database name used in qualified references
    #[arg(long, env = "SQLDRIFT_DB_NAME", default_value = "tpch")]
    db_name: String,

    /// Schema name used by the base target
    #[arg(long, env = "SQLDRIFT_BASE_SCHEMA", default_value = "base")]
    base_schema: String,

    /// Schema name used by the current target
    #[arg(long, env = "SQLDRIFT_CURRENT_SCHEMA", default_value = "current")]
    current_schema: String,
}

impl From<TargetArgs> for DiffOptions {
    fn from(args: TargetArgs) -> Self {
        DiffOptions {
            db_name: args.db_name,
            base_schema: args.base_schema,
            current_schema: args.current_schema,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TableChoice {
    /// Flag build-target and clock references
    Current,
    /// Flag every conditional-materialization model
    MaterializationProxy,
}

impl TableChoice {
    fn table(self) -> SignatureTable {
        match self {
            TableChoice::Current => SignatureTable::current(),
            TableChoice::MaterializationProxy => SignatureTable::materialization_proxy(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Stdout carries reports; logs go to stderr.
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    sqldrift_core::init_tracing(cli.log_json, level);

    match cli.command {
        Commands::Detect {
            manifest,
            signatures,
            json,
        } => cmd_detect(&manifest, signatures.table(), json),
        Commands::Diff {
            base_dir,
            current_dir,
            use_manifest,
            base_manifest,
            current_manifest,
            target,
            json,
        } => {
            let options = DiffOptions::from(target);
            if use_manifest {
                cmd_diff_manifests(&base_manifest, &current_manifest, &options, json)
            } else {
                cmd_diff_dirs(&base_dir, &current_dir, &options, json)
            }
        }
        Commands::Compare {
            fixture,
            manifest,
            base_dir,
            current_dir,
            base_dir_full_refresh,
            current_dir_full_refresh,
            target,
            ground_truth,
            in_process,
            json,
        } => {
            let inputs = match fixture {
                Some(root) => ApproachInputs {
                    diff: DiffOptions::from(target),
                    ..ApproachInputs::fixture(&root)
                },
                None => ApproachInputs {
                    manifest,
                    base_dir,
                    current_dir,
                    base_dir_full_refresh,
                    current_dir_full_refresh,
                    diff: DiffOptions::from(target),
                },
            };
            cmd_compare(&inputs, ground_truth.as_deref(), in_process, json).await
        }
        Commands::RowCounts {
            base,
            current,
            json,
        } => cmd_row_counts(&base, &current, json),
    }
}

fn cmd_detect(manifest_path: &Path, table: SignatureTable, json: bool) -> Result<()> {
    println!("{}", detect_output(manifest_path, table, json)?);
    Ok(())
}

fn detect_output(manifest_path: &Path, table: SignatureTable, json: bool) -> Result<String> {
    let _span = AnalysisSpan::enter("detect", &manifest_path.to_string_lossy());
    let manifest = Manifest::load(manifest_path)?;
    let report = DetectReport::analyze(&manifest, &PatternScanner::new(table));
    debug!(flagged = report.sql_findings.len(), "Detection finished");

    if json {
        Ok(serde_json::to_string_pretty(&report)?)
    } else {
        Ok(render_detect(&report))
    }
}

fn cmd_diff_dirs(base: &Path, current: &Path, options: &DiffOptions, json: bool) -> Result<()> {
    let _span = AnalysisSpan::enter("diff", &base.to_string_lossy());
    let report = diff_corpora(
        &DirectoryCorpus::new(base, "pg-base"),
        &DirectoryCorpus::new(current, "pg-current"),
        options,
    )?;
    println!("{}", diff_output(&report, json)?);
    Ok(())
}

fn cmd_diff_manifests(
    base: &Path,
    current: &Path,
    options: &DiffOptions,
    json: bool,
) -> Result<()> {
    let _span = AnalysisSpan::enter("diff", &base.to_string_lossy());
    let (base_corpus, current_corpus) = ManifestCorpus::load_pair(base, current)?;
    let report = diff_corpora(&base_corpus, &current_corpus, options)?;
    println!("{}", diff_output(&report, json)?);
    Ok(())
}

fn diff_output(report: &sqldrift_core::DiffReport, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(&DiffOutput::from(report))?)
    } else {
        Ok(render_diff(report))
    }
}

async fn cmd_compare(
    inputs: &ApproachInputs,
    ground_truth: Option<&Path>,
    in_process: bool,
    json: bool,
) -> Result<()> {
    let _span = AnalysisSpan::enter("compare", &inputs.manifest.to_string_lossy());
    let truth = match ground_truth {
        Some(path) => GroundTruth::load(path)?,
        None => GroundTruth::default(),
    };

    let producers = if in_process {
        in_process_producers(inputs)
    } else {
        let exe = std::env::current_exe().context("Failed to locate the sqldrift executable")?;
        subprocess_producers(&exe, inputs)
    };

    let result = ComparisonHarness::run(&producers, &truth).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", render_comparison(&result));
    }
    Ok(())
}

fn cmd_row_counts(base: &Path, current: &Path, json: bool) -> Result<()> {
    let comparison = compare_sources(&JsonCountsFile::new(base), &JsonCountsFile::new(current))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
    } else {
        println!(
            "{}",
            render_row_counts(&comparison, &label_of(base), &label_of(current))
        );
    }
    Ok(())
}

fn label_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
