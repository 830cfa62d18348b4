use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{StorageBackend, StorageResult};
use crate::error::StorageError;
use crate::note::Note;

/// Flat-document store: the whole collection as one JSON array under a
/// single namespaced key, kept as `<dir>/<namespace>.<key>.json`.
///
/// `load_sync`/`save_sync` do the file work; the async trait methods run
/// them on the blocking pool. A save serializes once and replaces the file
/// through a rename, so readers see the old or the new blob.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
    quota: Option<usize>,
}

impl DocumentStore {
    pub fn new(dir: &Path, namespace: &str, key: &str) -> Self {
        Self {
            path: dir.join(format!("{}.{}.json", namespace, key)),
            quota: None,
        }
    }

    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_sync(&self) -> StorageResult<Vec<Note>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let blob = std::fs::read_to_string(&self.path)?;
        if blob.trim().is_empty() {
            return Ok(Vec::new());
        }
        let notes: Vec<Note> = serde_json::from_str(&blob)?;
        debug!(path = %self.path.display(), count = notes.len(), "Loaded document");
        Ok(notes)
    }

    pub fn save_sync(&self, notes: &[Note]) -> StorageResult<()> {
        let blob = serde_json::to_string(notes)
            .map_err(|e| StorageError::Corrupt(format!("failed to serialize notes: {}", e)))?;

        if let Some(limit) = self.quota {
            if blob.len() > limit {
                return Err(StorageError::QuotaExceeded {
                    size: blob.len(),
                    limit,
                });
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, blob.as_bytes())?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), count = notes.len(), bytes = blob.len(), "Saved document");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for DocumentStore {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn load_all(&self) -> StorageResult<Vec<Note>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_sync())
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    async fn save_all(&self, notes: &[Note]) -> StorageResult<()> {
        let store = self.clone();
        let notes = notes.to_vec();
        tokio::task::spawn_blocking(move || store.save_sync(&notes))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::now;
    use tempfile::TempDir;

    fn sample(id: i64, title: &str) -> Note {
        let mut note = Note::new(id, now());
        note.title = title.to_string();
        note.content = format!("<p>{}</p>", title);
        note
    }

    #[test]
    fn test_missing_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path(), "ns", "notes");
        assert!(store.load_sync().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path(), "ns", "notes");
        let notes = vec![sample(1, "one"), sample(2, "two")];
        store.save_sync(&notes).unwrap();

        assert_eq!(store.path(), dir.path().join("ns.notes.json"));
        assert_eq!(store.load_sync().unwrap(), notes);
        assert!(!dir.path().join("ns.notes.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_collection() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path(), "ns", "notes");
        store.save_sync(&[sample(1, "one"), sample(2, "two")]).unwrap();
        store.save_sync(&[sample(3, "three")]).unwrap();

        let loaded = store.load_sync().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, 3);
    }

    #[test]
    fn test_corrupt_document() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path(), "ns", "notes");
        std::fs::write(store.path(), "[{\"id\": ").unwrap();
        assert!(matches!(store.load_sync(), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_quota_leaves_old_document() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path(), "ns", "notes").with_quota(Some(400));
        let small = vec![sample(1, "one")];
        store.save_sync(&small).unwrap();

        let mut big = sample(2, "big");
        big.content = "x".repeat(1000);
        let err = store.save_sync(&[big]).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { limit: 400, .. }));
        assert_eq!(store.load_sync().unwrap(), small);
    }

    #[tokio::test]
    async fn test_trait_round_trip_on_blocking_pool() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(&dir.path().join("nested"), "ns", "notes").with_quota(Some(400));
        let notes = vec![sample(7, "seven")];
        store.save_all(&notes).await.unwrap();
        assert_eq!(store.load_all().await.unwrap(), notes);

        let mut big = sample(8, "big");
        big.content = "x".repeat(1000);
        assert!(matches!(
            store.save_all(&[big]).await,
            Err(StorageError::QuotaExceeded { .. })
        ));
    }
}
