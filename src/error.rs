use thiserror::Error;

/// Failure of a single storage medium. Every variant counts as the
/// medium being unavailable and is what the fallback path reacts to.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored collection is corrupt: {0}")]
    Corrupt(String),

    #[error("quota exceeded: {size} bytes over a limit of {limit}")]
    QuotaExceeded { size: usize, limit: usize },

    #[error("{backend} did not complete within {millis} ms")]
    Timeout { backend: &'static str, millis: u64 },

    #[error("{0} is unavailable")]
    Unavailable(String),

    #[error("storage worker failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum NotesError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    #[error("persistence failed (primary: {primary}; secondary: {secondary})")]
    PersistenceFailed { primary: String, secondary: String },

    #[error("note {0} not found")]
    NotFound(i64),

    #[error("invalid import format: {0}")]
    InvalidImportFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no free note id left")]
    IdsExhausted,
}

impl NotesError {
    pub fn invalid_import(message: impl Into<String>) -> Self {
        NotesError::InvalidImportFormat(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NotesError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, NotesError>;
