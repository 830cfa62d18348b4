use tracing::{debug, info, warn};

use crate::config::FailurePolicy;
use crate::error::{NotesError, Result};
use crate::fallback::FallbackCoordinator;
use crate::note::{self, sort_by_recency, title_or_placeholder, IdSource, Note, NoteMetadata};
use crate::reconcile::assign_ids;
use crate::session::Session;

/// Where a mutation ended up after it was applied in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    Persisted { backend: &'static str },
    /// Applied in memory only; the reason persistence failed
    NotPersisted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<T> {
    pub value: T,
    pub persistence: Persistence,
}

impl<T> Applied<T> {
    pub fn is_persisted(&self) -> bool {
        matches!(self.persistence, Persistence::Persisted { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Applied<U> {
        Applied {
            value: f(self.value),
            persistence: self.persistence,
        }
    }
}

struct Snapshot {
    notes: Vec<Note>,
    session: Session,
}

/// The in-memory note collection and its path to durable storage.
///
/// The collection is kept sorted newest `updated_at` first. A created or
/// saved note is moved to the front before the stable sort, so it lists
/// first among notes with an equal timestamp. Every mutation writes the whole
/// collection; taking `&mut self` keeps those writes from overlapping.
pub struct NoteRepository {
    notes: Vec<Note>,
    session: Session,
    ids: IdSource,
    storage: FallbackCoordinator,
    policy: FailurePolicy,
}

impl NoteRepository {
    pub fn new(storage: FallbackCoordinator, policy: FailurePolicy) -> Self {
        Self {
            notes: Vec::new(),
            session: Session::default(),
            ids: IdSource::new(),
            storage,
            policy,
        }
    }

    /// Replace the working set with what storage holds.
    pub async fn load(&mut self) -> Result<usize> {
        let (mut notes, backend) = self.storage.load_all().await?;

        let original: Vec<Option<i64>> = notes.iter().map(|n| Some(n.id)).collect();
        let resolved = assign_ids(&original)?;
        for (note, id) in notes.iter_mut().zip(resolved) {
            if note.id != id {
                warn!(from = note.id, to = id, "Renumbered duplicate stored id");
                note.id = id;
            }
        }
        sort_by_recency(&mut notes);

        self.notes = notes;
        self.observe_ids();
        if let Some(selected) = self.session.selected() {
            if self.find(selected).is_none() {
                self.session.clear();
            }
        }
        info!(backend, count = self.notes.len(), "Loaded notes");
        Ok(self.notes.len())
    }

    pub fn list(&self) -> &[Note] {
        &self.notes
    }

    pub fn metadata(&self) -> Vec<NoteMetadata> {
        self.notes.iter().map(Note::metadata).collect()
    }

    pub fn find(&self, id: i64) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Case-insensitive substring match on the title or the content's plain
    /// text. A blank term matches everything.
    pub fn search(&self, term: &str) -> Vec<Note> {
        if term.trim().is_empty() {
            return self.notes.clone();
        }
        let term = term.to_lowercase();
        self.notes.iter().filter(|n| n.matches(&term)).cloned().collect()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Select an existing note.
    pub fn select(&mut self, id: i64) -> Result<&Note> {
        if self.find(id).is_none() {
            return Err(NotesError::NotFound(id));
        }
        self.session.select(id);
        self.find(id).ok_or(NotesError::NotFound(id))
    }

    pub fn begin_edit(&mut self) -> bool {
        self.session.begin_edit()
    }

    pub fn end_edit(&mut self) {
        self.session.end_edit();
    }

    pub fn clear_selection(&mut self) {
        self.session.clear();
    }

    /// Name of the backend writes currently go to.
    pub fn active_backend(&self) -> &'static str {
        self.storage.active()
    }

    pub async fn create(&mut self) -> Result<Applied<Note>> {
        let before = self.snapshot();

        let notes = &self.notes;
        let id = self
            .ids
            .next(|id| notes.iter().any(|n| n.id == id))
            .ok_or(NotesError::IdsExhausted)?;
        let note = Note::new(id, note::now());
        self.notes.insert(0, note.clone());
        sort_by_recency(&mut self.notes);
        debug!(id, "Created note");

        self.commit(note, before).await
    }

    pub async fn save(&mut self, id: i64, title: &str, content: &str) -> Result<Applied<Note>> {
        let index = self
            .notes
            .iter()
            .position(|n| n.id == id)
            .ok_or(NotesError::NotFound(id))?;
        let before = self.snapshot();

        let mut note = self.notes.remove(index);
        note.title = title_or_placeholder(title);
        note.content = content.to_string();
        note.updated_at = note::now().max(note.created_at);
        self.notes.insert(0, note.clone());
        sort_by_recency(&mut self.notes);
        debug!(id, "Saved note");

        self.commit(note, before).await
    }

    /// Remove a note, returning it.
    pub async fn delete(&mut self, id: i64) -> Result<Applied<Note>> {
        let index = self
            .notes
            .iter()
            .position(|n| n.id == id)
            .ok_or(NotesError::NotFound(id))?;
        let before = self.snapshot();

        let removed = self.notes.remove(index);
        self.session.forget(id);
        debug!(id, "Deleted note");

        self.commit(removed, before).await
    }

    /// Swap in a reconciled collection. Ids must already be distinct.
    pub async fn replace_all(&mut self, notes: Vec<Note>) -> Result<Applied<usize>> {
        let before = self.snapshot();

        self.notes = notes;
        sort_by_recency(&mut self.notes);
        self.observe_ids();
        if let Some(selected) = self.session.selected() {
            if self.find(selected).is_none() {
                self.session.clear();
            }
        }

        let count = self.notes.len();
        self.commit(count, before).await
    }

    fn observe_ids(&mut self) {
        if let Some(max) = self.notes.iter().map(|n| n.id).max() {
            self.ids.observe(max);
        }
    }

    fn snapshot(&self) -> Option<Snapshot> {
        match self.policy {
            FailurePolicy::Rollback => Some(Snapshot {
                notes: self.notes.clone(),
                session: self.session.clone(),
            }),
            FailurePolicy::KeepInMemory => None,
        }
    }

    async fn commit<T>(&mut self, value: T, before: Option<Snapshot>) -> Result<Applied<T>> {
        match self.storage.save_all(&self.notes).await {
            Ok(backend) => Ok(Applied {
                value,
                persistence: Persistence::Persisted { backend },
            }),
            Err(err) => match before {
                Some(snapshot) => {
                    warn!(error = %err, "Persistence failed, rolling back");
                    self.notes = snapshot.notes;
                    self.session = snapshot.session;
                    Err(err)
                }
                None => {
                    warn!(error = %err, "Persistence failed, keeping change in memory");
                    Ok(Applied {
                        value,
                        persistence: Persistence::NotPersisted(err.to_string()),
                    })
                }
            },
        }
    }
}
