//! Durable homes for the note collection.
//!
//! Every backend stores the whole collection: `save_all` replaces what is
//! persisted with exactly the given notes, or leaves it untouched on error.

mod document;
mod memory;
mod record;

pub use document::DocumentStore;
pub use memory::MemoryStore;
pub use record::{RecordStore, SCHEMA_VERSION};

use async_trait::async_trait;

use crate::config::{BackendKind, Settings};
use crate::error::StorageError;
use crate::note::Note;

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    async fn load_all(&self) -> StorageResult<Vec<Note>>;

    /// Atomically replace the persisted collection.
    async fn save_all(&self, notes: &[Note]) -> StorageResult<()>;
}

/// Build the backend `kind` from settings. Opening the record store runs
/// its migrations, so a broken database surfaces here.
pub fn open_backend(
    kind: BackendKind,
    settings: &Settings,
) -> StorageResult<Box<dyn StorageBackend>> {
    Ok(match kind {
        BackendKind::Record => Box::new(RecordStore::open(
            settings.record_path(),
            settings.transaction_timeout(),
        )?),
        BackendKind::Document => Box::new(
            DocumentStore::new(&settings.data_dir, &settings.namespace, &settings.document_key)
                .with_quota(settings.quota_bytes),
        ),
        BackendKind::Memory => Box::new(MemoryStore::new()),
    })
}
