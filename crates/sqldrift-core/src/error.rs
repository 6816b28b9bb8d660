//! Error taxonomy for sqldrift analysis.

use std::path::PathBuf;

/// Errors produced while loading and analysing project artifacts.
#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    /// A required input file or directory does not exist.
    #[error("{what} not found at {}\nRun: {hint}", path.display())]
    InputMissing {
        what: &'static str,
        path: PathBuf,
        hint: String,
    },

    /// The manifest parsed as JSON but does not have the expected shape.
    #[error("malformed manifest {}: {reason}", path.display())]
    MalformedManifest { path: PathBuf, reason: String },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriftError {
    /// Whether the error is caused by an absent input rather than bad content.
    pub fn is_input_missing(&self) -> bool {
        matches!(self, DriftError::InputMissing { .. })
    }
}

/// Result type for sqldrift core operations.
pub type Result<T> = std::result::Result<T, DriftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_missing_names_path_and_hint() {
        let err = DriftError::InputMissing {
            what: "manifest",
            path: PathBuf::from("target/manifest.json"),
            hint: "dbt parse".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("manifest not found at target/manifest.json"));
        assert!(msg.contains("Run: dbt parse"));
        assert!(err.is_input_missing());
    }

    #[test]
    fn test_malformed_manifest_display() {
        let err = DriftError::MalformedManifest {
            path: PathBuf::from("m.json"),
            reason: "`nodes` is not an object".to_string(),
        };
        assert!(err.to_string().contains("malformed manifest m.json"));
        assert!(!err.is_input_missing());
    }
}
