use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Default project-level word target for a novel-length manuscript.
pub const DEFAULT_PROJECT_WORD_TARGET: u32 = 80_000;

/// Default number of backup generations kept per chapter file.
pub const DEFAULT_BACKUP_COUNT: u32 = 5;

const METADATA_VERSION: &str = "1.0";

/// Word-count goals, project-wide and per chapter stem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordTargets {
    #[serde(default = "default_project_target")]
    pub project: u32,
    #[serde(default)]
    pub chapters: BTreeMap<String, u32>,
}

impl Default for WordTargets {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT_WORD_TARGET,
            chapters: BTreeMap::new(),
        }
    }
}

/// Per-project behaviour toggles stored alongside the manuscript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectSettings {
    #[serde(rename = "autoSave", default = "default_true")]
    pub auto_save: bool,
    #[serde(rename = "backupCount", default = "default_backup_count")]
    pub backup_count: u32,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            auto_save: true,
            backup_count: DEFAULT_BACKUP_COUNT,
        }
    }
}

/// 對應 `project.json` 的專案描述資料。 / The `project.json` record.
///
/// Field names on disk are camelCase where the wire format requires it;
/// timestamps are ISO-8601 strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub name: String,
    pub version: String,
    pub created: String,
    pub modified: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "wordTargets", default)]
    pub word_targets: WordTargets,
    #[serde(default)]
    pub settings: ProjectSettings,
}

impl ProjectMetadata {
    /// Fresh metadata for a project created now.
    pub fn new(name: impl Into<String>) -> Self {
        let now = current_timestamp();
        Self {
            name: name.into(),
            version: METADATA_VERSION.to_string(),
            created: now.clone(),
            modified: now,
            author: String::new(),
            description: String::new(),
            word_targets: WordTargets::default(),
            settings: ProjectSettings::default(),
        }
    }

    /// Stamps the record as modified now.
    pub fn touch(&mut self) {
        self.modified = current_timestamp();
    }
}

fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn default_project_target() -> u32 {
    DEFAULT_PROJECT_WORD_TARGET
}

fn default_backup_count() -> u32 {
    DEFAULT_BACKUP_COUNT
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metadata_carries_wire_defaults() {
        let metadata = ProjectMetadata::new("Book");
        assert_eq!(metadata.version, "1.0");
        assert_eq!(metadata.word_targets.project, 80_000);
        assert!(metadata.settings.auto_save);
        assert_eq!(metadata.settings.backup_count, 5);
        assert_eq!(metadata.created, metadata.modified);
    }

    #[test]
    fn wire_shape_uses_camel_case_sections() {
        let metadata = ProjectMetadata::new("Book");
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["wordTargets"]["project"], 80_000);
        assert_eq!(json["settings"]["autoSave"], true);
        assert_eq!(json["settings"]["backupCount"], 5);
    }

    #[test]
    fn missing_optional_sections_fall_back_to_defaults() {
        let json = r#"{
            "name": "Book",
            "version": "1.0",
            "created": "2026-01-01T00:00:00Z",
            "modified": "2026-01-01T00:00:00Z"
        }"#;
        let metadata: ProjectMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.word_targets.project, 80_000);
        assert!(metadata.settings.auto_save);
        assert!(metadata.author.is_empty());
    }
}
