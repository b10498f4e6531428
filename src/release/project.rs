use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::{ReleaseError, PROJECT_DESCRIPTION_FILE};

/// Something that looks like a version, `v0.3.1` or `1.2`.
static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"v?\d+\.\d+(\.\d+)?").expect("version pattern is valid")
});

fn default_project_name() -> String {
    "unknown_project".to_string()
}

fn default_project_version() -> String {
    "0.0.0".to_string()
}

/// The parts of `project_description.json` that name the release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectDescription {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_project_version")]
    pub project_version: String,
}

impl ProjectDescription {
    pub fn load(build_dir: &Path) -> Result<Self, ReleaseError> {
        let path = build_dir.join(PROJECT_DESCRIPTION_FILE);
        if !path.is_file() {
            return Err(ReleaseError::MissingInput(path));
        }
        let data = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Version used in the release name.
    ///
    /// A version from `git describe` like `v0.3.1-4-g1234567-dirty` is reduced to `v0.3.1`. If nothing that looks
    /// like a version is in there the cleaned string is used as is, and an empty one becomes `latest`.
    pub fn release_version(&self) -> String {
        let trimmed = self.project_version.trim();
        let cleaned = trimmed.strip_suffix("-dirty").unwrap_or(trimmed);
        match VERSION.find(cleaned) {
            Some(m) => m.as_str().to_string(),
            None if cleaned.is_empty() => "latest".to_string(),
            None => cleaned.to_string(),
        }
    }

    /// File name of the release zip, `<project>_<version>.zip`.
    pub fn release_file_name(&self) -> String {
        format!("{}_{}.zip", self.project_name, self.release_version())
    }
}
