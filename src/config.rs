use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Transactional SQLite record store
    Record,
    /// Single JSON document under a namespaced key
    Document,
    /// Process memory only
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Record => "record",
            BackendKind::Document => "document",
            BackendKind::Memory => "memory",
        }
    }
}

/// What a mutation does when the collection could not be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the in-memory change and report the failure
    #[default]
    #[serde(rename = "keep")]
    KeepInMemory,
    /// Restore the collection as it was before the call
    Rollback,
}

// App settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Folder holding every store file
    pub data_dir: PathBuf,
    pub primary: BackendKind,
    /// Degraded backend used once the primary fails
    pub secondary: Option<BackendKind>,
    /// Prefix of every key the document store writes
    pub namespace: String,
    pub document_key: String,
    pub record_file: String,
    pub transaction_timeout_ms: u64,
    /// Largest document the document store accepts
    pub quota_bytes: Option<usize>,
    pub on_persist_failure: FailurePolicy,
    pub export_prefix: String,
    pub autosave_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            primary: BackendKind::Record,
            secondary: Some(BackendKind::Document),
            namespace: "notekeep".to_string(),
            document_key: "richNotes".to_string(),
            record_file: "notes.db".to_string(),
            transaction_timeout_ms: 5_000,
            quota_bytes: Some(5 * 1024 * 1024),
            on_persist_failure: FailurePolicy::KeepInMemory,
            export_prefix: "backup-notes".to_string(),
            autosave_interval_secs: 30,
        }
    }
}

impl Settings {
    /// Defaults rooted at `data_dir`.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms.max(1))
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        if self.autosave_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.autosave_interval_secs))
        }
    }

    pub fn record_path(&self) -> PathBuf {
        self.data_dir.join(&self.record_file)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.secondary == Some(self.primary) {
            return Err(format!(
                "secondary backend must differ from the primary ('{}')",
                self.primary.as_str()
            ));
        }
        if self.document_key.trim().is_empty() {
            return Err("documentKey must not be empty".to_string());
        }
        if self.export_prefix.trim().is_empty() {
            return Err("exportPrefix must not be empty".to_string());
        }
        Ok(())
    }
}

// Get settings file path
pub fn get_settings_path(config_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(config_dir)?;
    Ok(config_dir.join(SETTINGS_FILE))
}

// Load settings from disk, falling back to defaults
pub fn load_settings(path: &Path) -> Settings {
    if path.exists() {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    } else {
        Settings::default()
    }
}

// Save settings to disk
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "primary": "document", "secondary": null, "onPersistFailure": "rollback" }"#)
                .unwrap();
        assert_eq!(settings.primary, BackendKind::Document);
        assert_eq!(settings.secondary, None);
        assert_eq!(settings.on_persist_failure, FailurePolicy::Rollback);
        assert_eq!(settings.export_prefix, "backup-notes");
        assert_eq!(settings.autosave_interval_secs, 30);
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = get_settings_path(dir.path()).unwrap();

        let mut settings = Settings::in_dir(dir.path());
        settings.on_persist_failure = FailurePolicy::Rollback;
        settings.quota_bytes = None;
        save_settings(&path, &settings).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"onPersistFailure\": \"rollback\""));

        let loaded = load_settings(&path);
        assert_eq!(loaded.on_persist_failure, FailurePolicy::Rollback);
        assert_eq!(loaded.quota_bytes, None);
        assert_eq!(loaded.data_dir, dir.path());
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        let settings = load_settings(&path);
        assert_eq!(settings.primary, BackendKind::Record);
    }

    #[test]
    fn test_validate_rejects_same_backends() {
        let mut settings = Settings::default();
        settings.secondary = Some(BackendKind::Record);
        assert!(settings.validate().is_err());
        settings.secondary = None;
        assert!(settings.validate().is_ok());
    }
}
