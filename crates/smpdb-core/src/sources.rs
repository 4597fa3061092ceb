use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ConfigError;

/// One spreadsheet tab tracked for collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetSourceConfig {
    /// Spreadsheet document id.
    pub source_id: String,
    /// Tab name within the document.
    pub sheet_name: String,
    /// Optional logical group persisted records are linked to.
    pub group_id: Option<Uuid>,
    /// Human-readable label for logs and status output.
    pub label: Option<String>,
}

impl SheetSourceConfig {
    /// Label for logs: the configured label, or `source_id/sheet_name`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.source_id, self.sheet_name))
    }
}

#[derive(Debug, Deserialize)]
pub struct SourcesFile {
    pub sources: Vec<SheetSourceConfig>,
}

/// Load and validate the sheet-sources configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_sources(path: &Path) -> Result<SourcesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SourcesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let sources_file: SourcesFile = serde_yaml::from_str(&content)?;

    validate_sources(&sources_file)?;

    Ok(sources_file)
}

fn validate_sources(file: &SourcesFile) -> Result<(), ConfigError> {
    if file.sources.is_empty() {
        return Err(ConfigError::SourcesInvalid(
            "sources list is empty".to_owned(),
        ));
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    for source in &file.sources {
        if source.source_id.trim().is_empty() {
            return Err(ConfigError::SourcesInvalid(
                "source_id must not be empty".to_owned(),
            ));
        }
        if source.sheet_name.trim().is_empty() {
            return Err(ConfigError::SourcesInvalid(format!(
                "sheet_name must not be empty (source {})",
                source.source_id
            )));
        }
        if !seen.insert((source.source_id.clone(), source.sheet_name.clone())) {
            return Err(ConfigError::SourcesInvalid(format!(
                "duplicate source entry: {}/{}",
                source.source_id, source.sheet_name
            )));
        }
    }

    Ok(())
}
