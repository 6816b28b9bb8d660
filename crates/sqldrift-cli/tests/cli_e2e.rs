//! End-to-end tests for the `sqldrift` binary on the tpch_metrics fixture.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/tpch_metrics")
}

fn sqldrift(args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sqldrift"));
    for var in [
        "SQLDRIFT_MANIFEST",
        "SQLDRIFT_BASE_DIR",
        "SQLDRIFT_CURRENT_DIR",
        "SQLDRIFT_DB_NAME",
        "SQLDRIFT_BASE_SCHEMA",
        "SQLDRIFT_CURRENT_SCHEMA",
        "SQLDRIFT_GROUND_TRUTH",
    ] {
        cmd.env_remove(var);
    }
    cmd.args(args).output().expect("failed to spawn sqldrift")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "sqldrift failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn flagged(value: &Value, list: &str, field: &str) -> Vec<String> {
    let mut names: Vec<String> = value[list]
        .as_array()
        .expect("list")
        .iter()
        .map(|v| v[field].as_str().expect("name").to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn detect_json_flags_target_dependent_models() {
    let manifest = fixture_root().join("manifest.json");
    let out = sqldrift(&["detect", "--manifest", manifest.to_str().unwrap(), "--json"]);
    let value = stdout_json(&out);

    assert_eq!(
        flagged(&value, "sql_findings", "name"),
        vec![
            "metrics_daily_shipments",
            "metrics_order_summary",
            "metrics_regional_revenue",
            "metrics_shipping_efficiency",
        ]
    );
    assert_eq!(value["classification"]["recommendation"], "isolated_base");
    assert_eq!(value["classification"]["confidence"], "medium");
    assert_eq!(value["sources"]["with_event_time"], 2);
}

#[test]
fn detect_text_report_has_recommendation() {
    let manifest = fixture_root().join("manifest.json");
    let out = sqldrift(&["detect", "--manifest", manifest.to_str().unwrap()]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("RECOMMENDATION: Isolated Base (medium confidence)"));
}

#[test]
fn diff_existing_tables_misses_incremental_branch() {
    let root = fixture_root();
    let out = sqldrift(&[
        "diff",
        "--base-dir",
        root.join("compiled_base").to_str().unwrap(),
        "--current-dir",
        root.join("compiled_current").to_str().unwrap(),
        "--json",
    ]);
    let value = stdout_json(&out);

    assert_eq!(value["approach"], "compiled file diff");
    assert_eq!(
        flagged(&value, "non_deterministic", "model"),
        vec![
            "metrics_order_summary",
            "metrics_regional_revenue",
            "metrics_shipping_efficiency",
        ]
    );
    assert!(value["missing"].as_array().unwrap().is_empty());
}

#[test]
fn diff_full_refresh_catches_every_positive() {
    let root = fixture_root();
    let out = sqldrift(&[
        "diff",
        "--base-dir",
        root.join("compiled_base_fr").to_str().unwrap(),
        "--current-dir",
        root.join("compiled_current_fr").to_str().unwrap(),
        "--json",
    ]);
    let value = stdout_json(&out);
    assert_eq!(flagged(&value, "non_deterministic", "model").len(), 4);
}

#[test]
fn compare_scores_each_approach() {
    let root = fixture_root();
    let out = sqldrift(&["compare", "--fixture", root.to_str().unwrap(), "--json"]);
    let value = stdout_json(&out);

    let accuracy = |name: &str| {
        value["scores"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["approach"] == name)
            .map(|s| s["accuracy"].as_f64().unwrap())
            .unwrap()
    };
    assert_eq!(accuracy("pattern_scan"), 100.0);
    assert_eq!(accuracy("compiled_diff_existing"), 80.0);
    assert_eq!(accuracy("compiled_diff_full_refresh"), 100.0);
}

#[test]
fn compare_degrades_missing_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let out = sqldrift(&[
        "compare",
        "--fixture",
        dir.path().to_str().unwrap(),
        "--in-process",
    ]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("(failed, scored as flagging nothing)"));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Error running Template Pattern Scanning"));
}

#[test]
fn missing_manifest_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("manifest.json");
    let out = sqldrift(&["detect", "--manifest", manifest.to_str().unwrap()]);

    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("dbt parse"), "stderr: {stderr}");
}

#[test]
fn missing_compiled_dir_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let out = sqldrift(&[
        "diff",
        "--base-dir",
        dir.path().join("nope").to_str().unwrap(),
        "--current-dir",
        dir.path().to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("dbt compile"));
}
