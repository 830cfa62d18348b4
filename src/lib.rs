pub mod config;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod note;
pub mod reconcile;
pub mod repository;
pub mod session;
pub mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use config::{BackendKind, FailurePolicy, Settings};
pub use error::{NotesError, Result, StorageError};
pub use fallback::FallbackCoordinator;
pub use note::{Note, NoteMetadata, NoteStats};
pub use reconcile::ImportMode;
pub use repository::{Applied, NoteRepository, Persistence};
pub use session::{EditorSurface, NoticeLevel, Notifier, Session, TracingNotifier};
pub use storage::{open_backend, StorageBackend};

// Export payload handed to whatever writes or downloads it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(Applied<Note>),
    /// No note had that id; nothing changed
    Missing,
}

/// Entry point for the UI layer. Confirmation of destructive calls
/// (delete, replace-mode import) happens before these methods are called.
pub struct NotesApp {
    repo: Mutex<NoteRepository>,
    settings: Settings,
    notifier: Arc<dyn Notifier>,
}

impl NotesApp {
    pub async fn open(settings: Settings) -> Result<Self> {
        Self::open_with_notifier(settings, Arc::new(TracingNotifier)).await
    }

    pub async fn open_with_notifier(settings: Settings, notifier: Arc<dyn Notifier>) -> Result<Self> {
        settings.validate().map_err(NotesError::Config)?;
        let coordinator = build_coordinator(&settings)?;
        Self::with_storage(settings, coordinator, notifier).await
    }

    /// Start a session over an already built coordinator. A collection
    /// that cannot be loaded from any backend leaves the session empty.
    pub async fn with_storage(
        settings: Settings,
        coordinator: FallbackCoordinator,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let mut repo = NoteRepository::new(coordinator, settings.on_persist_failure);
        if let Err(err) = repo.load().await {
            error!(error = %err, "Failed to load notes, starting empty");
            notifier.notify(NoticeLevel::Error, "Could not load saved notes");
        }
        Ok(Self {
            repo: Mutex::new(repo),
            settings,
            notifier,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn active_backend(&self) -> &'static str {
        self.repo.lock().await.active_backend()
    }

    pub async fn list(&self) -> Vec<Note> {
        self.repo.lock().await.list().to_vec()
    }

    pub async fn metadata(&self) -> Vec<NoteMetadata> {
        self.repo.lock().await.metadata()
    }

    pub async fn find(&self, id: i64) -> Option<Note> {
        self.repo.lock().await.find(id).cloned()
    }

    pub async fn search(&self, term: &str) -> Vec<Note> {
        self.repo.lock().await.search(term)
    }

    pub async fn stats(&self, id: i64) -> Option<NoteStats> {
        self.repo.lock().await.find(id).map(Note::stats)
    }

    pub async fn session(&self) -> Session {
        self.repo.lock().await.session().clone()
    }

    pub async fn select(&self, id: i64) -> Result<Note> {
        let mut repo = self.repo.lock().await;
        let note = repo.select(id)?.clone();
        Ok(note)
    }

    pub async fn begin_edit(&self) -> bool {
        self.repo.lock().await.begin_edit()
    }

    pub async fn cancel_edit(&self) {
        self.repo.lock().await.end_edit();
    }

    /// Create a note, select it and open it for editing.
    pub async fn create(&self) -> Result<Applied<Note>> {
        let mut repo = self.repo.lock().await;
        let applied = repo.create().await?;
        repo.select(applied.value.id)?;
        repo.begin_edit();
        self.report(&applied.persistence, "Note created");
        Ok(applied)
    }

    pub async fn save(&self, id: i64, title: &str, content: &str) -> Result<Applied<Note>> {
        let mut repo = self.repo.lock().await;
        let applied = repo.save(id, title, content).await?;
        if repo.session().selected() == Some(id) {
            repo.end_edit();
        }
        self.report(&applied.persistence, "Note saved");
        Ok(applied)
    }

    pub async fn delete(&self, id: i64) -> Result<DeleteOutcome> {
        let mut repo = self.repo.lock().await;
        match repo.delete(id).await {
            Ok(applied) => {
                self.report(&applied.persistence, "Note deleted");
                Ok(DeleteOutcome::Deleted(applied))
            }
            Err(NotesError::NotFound(id)) => {
                warn!(id, "Delete of unknown note ignored");
                Ok(DeleteOutcome::Missing)
            }
            Err(err) => Err(err),
        }
    }

    /// Save the selected note from the editor when it is being edited.
    /// Editing stays on, so periodic saves do not interrupt the user.
    pub async fn save_from_editor(&self, editor: &dyn EditorSurface) -> Result<Option<Applied<Note>>> {
        let mut repo = self.repo.lock().await;
        let Some(id) = repo.session().selected() else {
            return Ok(None);
        };
        if !repo.session().is_editing() {
            return Ok(None);
        }
        let applied = repo.save(id, &editor.title(), &editor.content()).await?;
        if let Persistence::NotPersisted(reason) = &applied.persistence {
            warn!(id, reason = %reason, "Auto-save kept in memory only");
        }
        Ok(Some(applied))
    }

    pub async fn export(&self) -> Result<ExportFile> {
        let notes = self.list().await;
        if notes.is_empty() {
            self.notifier.notify(NoticeLevel::Warning, "There are no notes to export");
        }
        let contents = reconcile::export_json(&notes)?;
        let file_name = reconcile::export_file_name(
            &self.settings.export_prefix,
            chrono::Utc::now().date_naive(),
        );
        info!(count = notes.len(), file = %file_name, "Exported notes");
        Ok(ExportFile { file_name, contents })
    }

    /// Write the export into `dir`, returning the file's path.
    pub async fn export_to(&self, dir: &Path) -> Result<PathBuf> {
        let export = self.export().await?;
        fs::create_dir_all(dir).await?;
        let path = dir.join(&export.file_name);
        fs::write(&path, export.contents.as_bytes()).await?;
        self.notifier.notify(
            NoticeLevel::Success,
            &format!("Backup written to {}", path.display()),
        );
        Ok(path)
    }

    /// Import a raw export. Returns how many notes the payload held.
    /// A malformed payload changes nothing.
    pub async fn import(&self, raw: &str, mode: ImportMode) -> Result<Applied<usize>> {
        let incoming = match reconcile::parse_import(raw) {
            Ok(notes) => notes,
            Err(err) => {
                warn!(error = %err, "Rejected import");
                self.notifier.notify(NoticeLevel::Error, "Could not import file");
                return Err(err);
            }
        };
        let count = incoming.len();

        let mut repo = self.repo.lock().await;
        let reconciled = reconcile::reconcile(repo.list(), incoming, mode)?;
        let applied = repo.replace_all(reconciled).await?;
        info!(count, ?mode, total = applied.value, "Imported notes");
        self.report(&applied.persistence, &format!("Imported {} notes", count));
        Ok(applied.map(|_| count))
    }

    /// Read the whole file, then import it.
    pub async fn import_file(&self, path: &Path, mode: ImportMode) -> Result<Applied<usize>> {
        let raw = fs::read_to_string(path).await?;
        self.import(&raw, mode).await
    }

    fn report(&self, persistence: &Persistence, success: &str) {
        match persistence {
            Persistence::Persisted { .. } => self.notifier.notify(NoticeLevel::Success, success),
            Persistence::NotPersisted(_) => self.notifier.notify(
                NoticeLevel::Error,
                "Changes could not be saved to storage and are kept for this session only",
            ),
        }
    }
}

/// Open the configured backends. A primary that cannot be opened is
/// replaced by the secondary up front.
pub fn build_coordinator(settings: &Settings) -> Result<FallbackCoordinator> {
    let secondary = match settings.secondary {
        Some(kind) => match open_backend(kind, settings) {
            Ok(backend) => Some(backend),
            Err(err) => {
                warn!(backend = kind.as_str(), error = %err, "Secondary storage unavailable");
                None
            }
        },
        None => None,
    };

    match open_backend(settings.primary, settings) {
        Ok(primary) => Ok(FallbackCoordinator::new(primary, secondary)),
        Err(err) => match secondary {
            Some(secondary) => {
                warn!(
                    primary = settings.primary.as_str(),
                    secondary = secondary.name(),
                    error = %err,
                    "Primary storage could not be opened, using secondary"
                );
                Ok(FallbackCoordinator::new(secondary, None))
            }
            None => Err(err.into()),
        },
    }
}

/// Periodically save the note being edited. Returns `None` when auto-save
/// is disabled in settings.
pub fn spawn_autosave(app: Arc<NotesApp>, editor: Arc<dyn EditorSurface>) -> Option<JoinHandle<()>> {
    let period = app.settings().autosave_interval()?;
    Some(tokio::spawn(autosave_loop(app, editor, period)))
}

async fn autosave_loop(app: Arc<NotesApp>, editor: Arc<dyn EditorSurface>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(err) = app.save_from_editor(editor.as_ref()).await {
            warn!(error = %err, "Auto-save failed");
        }
    }
}
