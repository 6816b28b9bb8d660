//! Manifest loading and metadata extraction.
//!
//! A manifest maps unique ids to node and source records. Extraction keeps
//! only the models and snapshots owned by the manifest's own project; nodes
//! from imported packages are dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DriftError, Result};

const MANIFEST_HINT: &str = "dbt parse (or dbt build) to generate the manifest";

// ---------------------------------------------------------------------------
// Raw manifest document
// ---------------------------------------------------------------------------

/// The subset of a manifest document that sqldrift reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub metadata: ManifestMetadata,
    #[serde(default)]
    pub nodes: BTreeMap<String, ManifestNode>,
    #[serde(default)]
    pub sources: BTreeMap<String, ManifestSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestNode {
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub config: NodeConfig,
    #[serde(default)]
    pub depends_on: DependsOn,
    #[serde(default)]
    pub raw_code: Option<String>,
    #[serde(default)]
    pub compiled_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub materialized: Option<String>,
    #[serde(default)]
    pub incremental_strategy: Option<String>,
    /// A column name or a list of column names.
    #[serde(default)]
    pub unique_key: Option<Value>,
    /// Snapshot change-tracking strategy (`timestamp`, `check`).
    #[serde(default)]
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependsOn {
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestSource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub config: SourceConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub event_time: Option<String>,
}

impl Manifest {
    /// Load a manifest from disk.
    ///
    /// A missing file is [`DriftError::InputMissing`]; anything that is not a
    /// manifest-shaped JSON document is [`DriftError::MalformedManifest`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DriftError::InputMissing {
                what: "manifest",
                path: path.to_path_buf(),
                hint: MANIFEST_HINT.to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| DriftError::MalformedManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn project_name(&self) -> &str {
        self.metadata.project_name.as_deref().unwrap_or_default()
    }

    /// Nodes of the given resource type owned by the root project, in id order.
    pub fn project_nodes<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ManifestNode)> + 'a {
        self.package_nodes(resource_type, self.metadata.project_name.as_deref())
    }

    /// Nodes of the given resource type owned by `package`. A `None` package
    /// matches nothing.
    pub fn package_nodes<'a>(
        &'a self,
        resource_type: &'a str,
        package: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a String, &'a ManifestNode)> + 'a {
        self.nodes.iter().filter(move |(_, node)| {
            node.resource_type == resource_type && Some(node.package_name.as_str()) == package
        })
    }
}

// ---------------------------------------------------------------------------
// Typed records
// ---------------------------------------------------------------------------

/// Physical persistence strategy of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    Table,
    View,
    Ephemeral,
    Incremental,
    Other,
}

impl Materialization {
    pub const ALL: [Materialization; 5] = [
        Materialization::Table,
        Materialization::View,
        Materialization::Ephemeral,
        Materialization::Incremental,
        Materialization::Other,
    ];

    /// Map a configured materialization onto its bucket; unknown kinds are `Other`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "table" => Materialization::Table,
            "view" => Materialization::View,
            "ephemeral" => Materialization::Ephemeral,
            "incremental" => Materialization::Incremental,
            _ => Materialization::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Materialization::Table => "table",
            Materialization::View => "view",
            Materialization::Ephemeral => "ephemeral",
            Materialization::Incremental => "incremental",
            Materialization::Other => "other",
        }
    }
}

impl fmt::Display for Materialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count of models per materialization bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationCounts {
    pub table: usize,
    pub view: usize,
    pub ephemeral: usize,
    pub incremental: usize,
    pub other: usize,
}

impl MaterializationCounts {
    pub fn record(&mut self, kind: Materialization) {
        *self.slot(kind) += 1;
    }

    pub fn get(&self, kind: Materialization) -> usize {
        match kind {
            Materialization::Table => self.table,
            Materialization::View => self.view,
            Materialization::Ephemeral => self.ephemeral,
            Materialization::Incremental => self.incremental,
            Materialization::Other => self.other,
        }
    }

    pub fn total(&self) -> usize {
        Materialization::ALL.iter().map(|k| self.get(*k)).sum()
    }

    fn slot(&mut self, kind: Materialization) -> &mut usize {
        match kind {
            Materialization::Table => &mut self.table,
            Materialization::View => &mut self.view,
            Materialization::Ephemeral => &mut self.ephemeral,
            Materialization::Incremental => &mut self.incremental,
            Materialization::Other => &mut self.other,
        }
    }
}

/// A model definition owned by the root project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRecord {
    pub unique_id: String,
    pub name: String,
    pub path: String,
    pub materialization: Materialization,
    /// The configured materialization as written (`unknown` when absent).
    pub materialized: String,
    pub incremental_strategy: Option<String>,
    pub unique_key: Option<String>,
    pub raw_code: String,
    pub depends_on: Vec<String>,
}

impl ModelRecord {
    fn from_node(unique_id: &str, node: &ManifestNode) -> Self {
        let materialized = node
            .config
            .materialized
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            unique_id: unique_id.to_string(),
            name: node.name.clone().unwrap_or_else(|| unique_id.to_string()),
            path: node.path.clone(),
            materialization: Materialization::parse(&materialized),
            materialized,
            incremental_strategy: node.config.incremental_strategy.clone(),
            unique_key: node.config.unique_key.as_ref().and_then(render_unique_key),
            raw_code: node.raw_code.clone().unwrap_or_default(),
            depends_on: node.depends_on.nodes.clone(),
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.materialization == Materialization::Incremental
    }
}

fn render_unique_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

/// A snapshot definition owned by the root project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRecord {
    pub unique_id: String,
    pub name: String,
    pub path: String,
    pub strategy: Option<String>,
}

/// An externally owned input relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub unique_id: String,
    pub name: String,
    pub source_name: String,
    /// `None` when the source cannot be filtered to a time window.
    pub event_time: Option<String>,
}

impl SourceRecord {
    pub fn has_event_time(&self) -> bool {
        self.event_time.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Event-time coverage across all sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCoverage {
    pub total: usize,
    pub with_event_time: usize,
    pub without_event_time: usize,
}

impl SourceCoverage {
    /// `with_event_time / total * 100`, or `0.0` when there are no sources.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.with_event_time as f64 / self.total as f64 * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.with_event_time == self.total
    }
}

/// Typed view of one manifest, scoped to the root project.
#[derive(Debug, Clone, Default)]
pub struct ProjectMetadata {
    pub project_name: String,
    pub materialization_counts: MaterializationCounts,
    pub models: BTreeMap<String, ModelRecord>,
    pub snapshots: Vec<SnapshotRecord>,
    pub sources: Vec<SourceRecord>,
}

impl ProjectMetadata {
    pub fn extract(manifest: &Manifest) -> Self {
        let models: BTreeMap<String, ModelRecord> = manifest
            .project_nodes("model")
            .map(|(id, node)| {
                let record = ModelRecord::from_node(id, node);
                (record.name.clone(), record)
            })
            .collect();

        // Buckets are counted from the final map so they always sum to the model count.
        let mut materialization_counts = MaterializationCounts::default();
        for model in models.values() {
            materialization_counts.record(model.materialization);
        }

        let snapshots = manifest
            .project_nodes("snapshot")
            .map(|(id, node)| SnapshotRecord {
                unique_id: id.clone(),
                name: node.name.clone().unwrap_or_else(|| id.clone()),
                path: node.path.clone(),
                strategy: node.config.strategy.clone(),
            })
            .collect();

        let sources = manifest
            .sources
            .iter()
            .map(|(id, source)| SourceRecord {
                unique_id: id.clone(),
                name: source.name.clone().unwrap_or_else(|| id.clone()),
                source_name: source
                    .source_name
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                event_time: source.config.event_time.clone(),
            })
            .collect();

        Self {
            project_name: manifest.project_name().to_string(),
            materialization_counts,
            models,
            snapshots,
            sources,
        }
    }

    pub fn total_models(&self) -> usize {
        self.models.len()
    }

    pub fn incremental_models(&self) -> impl Iterator<Item = &ModelRecord> {
        self.models.values().filter(|m| m.is_incremental())
    }

    pub fn sources_without_event_time(&self) -> impl Iterator<Item = &SourceRecord> {
        self.sources.iter().filter(|s| !s.has_event_time())
    }

    pub fn source_coverage(&self) -> SourceCoverage {
        let with_event_time = self.sources.iter().filter(|s| s.has_event_time()).count();
        SourceCoverage {
            total: self.sources.len(),
            with_event_time,
            without_event_time: self.sources.len() - with_event_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_manifest() -> Manifest {
        serde_json::from_value(json!({
            "metadata": {"project_name": "tpch"},
            "nodes": {
                "model.tpch.orders": {
                    "resource_type": "model",
                    "package_name": "tpch",
                    "name": "orders",
                    "path": "staging/orders.sql",
                    "config": {"materialized": "incremental", "incremental_strategy": "merge", "unique_key": ["o_orderkey", "o_date"]},
                    "depends_on": {"nodes": ["source.tpch.raw.orders"]},
                    "raw_code": "select 1"
                },
                "model.tpch.customers": {
                    "resource_type": "model",
                    "package_name": "tpch",
                    "name": "customers",
                    "path": "staging/customers.sql",
                    "config": {"materialized": "materialized_view"}
                },
                "model.dbt_utils.helper": {
                    "resource_type": "model",
                    "package_name": "dbt_utils",
                    "name": "helper",
                    "config": {"materialized": "table"}
                },
                "snapshot.tpch.orders_snapshot": {
                    "resource_type": "snapshot",
                    "package_name": "tpch",
                    "name": "orders_snapshot",
                    "path": "snapshots/orders_snapshot.sql",
                    "config": {"strategy": "timestamp"}
                },
                "test.tpch.not_null": {
                    "resource_type": "test",
                    "package_name": "tpch",
                    "name": "not_null"
                }
            },
            "sources": {
                "source.tpch.raw.orders": {"name": "orders", "source_name": "raw", "config": {"event_time": "o_orderdate"}},
                "source.tpch.raw.nation": {"name": "nation", "source_name": "raw", "config": {"event_time": null}}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_extract_scopes_to_root_project() {
        let meta = ProjectMetadata::extract(&sample_manifest());
        assert_eq!(meta.project_name, "tpch");
        assert_eq!(meta.total_models(), 2);
        assert!(meta.models.contains_key("orders"));
        assert!(!meta.models.contains_key("helper"));
        assert_eq!(meta.snapshots.len(), 1);
        assert_eq!(meta.snapshots[0].strategy.as_deref(), Some("timestamp"));
    }

    #[test]
    fn test_unknown_materialization_goes_to_other() {
        let meta = ProjectMetadata::extract(&sample_manifest());
        let customers = &meta.models["customers"];
        assert_eq!(customers.materialization, Materialization::Other);
        assert_eq!(customers.materialized, "materialized_view");
        assert_eq!(meta.materialization_counts.other, 1);
        assert_eq!(meta.materialization_counts.incremental, 1);
        assert_eq!(meta.materialization_counts.total(), meta.total_models());
    }

    #[test]
    fn test_model_record_fields() {
        let meta = ProjectMetadata::extract(&sample_manifest());
        let orders = &meta.models["orders"];
        assert_eq!(orders.unique_id, "model.tpch.orders");
        assert_eq!(orders.incremental_strategy.as_deref(), Some("merge"));
        assert_eq!(orders.unique_key.as_deref(), Some("o_orderkey, o_date"));
        assert_eq!(orders.depends_on, vec!["source.tpch.raw.orders".to_string()]);
        assert_eq!(orders.raw_code, "select 1");
    }

    #[test]
    fn test_source_coverage() {
        let meta = ProjectMetadata::extract(&sample_manifest());
        let coverage = meta.source_coverage();
        assert_eq!(coverage.total, 2);
        assert_eq!(coverage.with_event_time, 1);
        assert_eq!(coverage.without_event_time, 1);
        assert_eq!(coverage.percent(), 50.0);
        assert!(!coverage.is_complete());
        let missing: Vec<_> = meta.sources_without_event_time().map(|s| s.name.as_str()).collect();
        assert_eq!(missing, vec!["nation"]);
    }

    #[test]
    fn test_zero_sources_coverage_is_zero() {
        assert_eq!(SourceCoverage::default().percent(), 0.0);
        assert!(!SourceCoverage::default().is_complete());
    }

    #[test]
    fn test_load_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("manifest.json")).unwrap_err();
        assert!(err.is_input_missing());
        assert!(err.to_string().contains("dbt parse"));
    }

    #[test]
    fn test_load_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"nodes": ["not", "a", "map"]}"#).unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, DriftError::MalformedManifest { .. }));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Manifest::load(&path).unwrap_err(),
            DriftError::MalformedManifest { .. }
        ));
    }
}
