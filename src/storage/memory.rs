use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{StorageBackend, StorageResult};
use crate::error::StorageError;
use crate::note::Note;

/// Process-local backend. Clones share the same contents, so a handle kept
/// outside a coordinator can inspect or break the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    notes: Mutex<Vec<Note>>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<Note>) -> Self {
        let store = Self::new();
        *store.inner.notes.lock() = notes;
        store
    }

    /// Make every later call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<Note> {
        self.inner.notes.lock().clone()
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    fn check(&self) -> StorageResult<()> {
        if self.inner.failing.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("memory store".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load_all(&self) -> StorageResult<Vec<Note>> {
        self.check()?;
        Ok(self.snapshot())
    }

    async fn save_all(&self, notes: &[Note]) -> StorageResult<()> {
        self.check()?;
        *self.inner.notes.lock() = notes.to_vec();
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::now;

    #[tokio::test]
    async fn test_failing_store_keeps_contents() {
        let store = MemoryStore::with_notes(vec![Note::new(1, now())]);
        store.set_failing(true);
        assert!(store.save_all(&[]).await.is_err());
        assert!(store.load_all().await.is_err());

        store.set_failing(false);
        assert_eq!(store.load_all().await.unwrap().len(), 1);
        assert_eq!(store.save_count(), 0);
    }
}
