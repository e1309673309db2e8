//! Artifact naming convention
//!
//! Backup artifacts are named `<prefix><timestamp><extension>`. The timestamp is
//! fixed-width, so sorting names lexicographically sorts them chronologically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout embedded in generated artifact names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Which object names count as backup artifacts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArtifactNaming {
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for ArtifactNaming {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            extensions: default_extensions(),
        }
    }
}

impl ArtifactNaming {
    pub fn new(prefix: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            prefix: prefix.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Check if a name is a backup artifact under this convention
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
            && name.len() > self.prefix.len()
            && self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// Whether `extension` is one of the approved extensions
    pub fn approves_extension(&self, extension: &str) -> bool {
        self.extensions.iter().any(|ext| ext == extension)
    }

    /// Build the artifact name for a backup taken at `at`
    pub fn artifact_name(&self, at: DateTime<Utc>, extension: &str) -> String {
        format!("{}{}{}", self.prefix, at.format(TIMESTAMP_FORMAT), extension)
    }
}

fn default_prefix() -> String {
    "pg-backup_".to_string()
}

fn default_extensions() -> Vec<String> {
    [".dump", ".sql", ".sql.gz", ".tar"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}
