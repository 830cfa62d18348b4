use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use crate::error::{NotesError, Result, StorageError};
use crate::note::Note;
use crate::storage::StorageBackend;

const NO_SECONDARY: &str = "no secondary backend configured";
const PRIMARY_ABANDONED: &str = "primary abandoned earlier in this session";

/// Routes persistence to the primary backend until it fails once, then to
/// the secondary for the rest of the session.
///
/// Because every write carries the full collection, the write that triggers
/// the switch leaves the secondary holding the complete session state. A
/// switch during a load makes whatever the secondary holds authoritative.
pub struct FallbackCoordinator {
    primary: Box<dyn StorageBackend>,
    secondary: Option<Box<dyn StorageBackend>>,
    degraded: AtomicBool,
}

impl FallbackCoordinator {
    pub fn new(primary: Box<dyn StorageBackend>, secondary: Option<Box<dyn StorageBackend>>) -> Self {
        Self {
            primary,
            secondary,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Name of the backend the next call goes to.
    pub fn active(&self) -> &'static str {
        match (&self.secondary, self.is_degraded()) {
            (Some(secondary), true) => secondary.name(),
            _ => self.primary.name(),
        }
    }

    pub async fn load_all(&self) -> Result<(Vec<Note>, &'static str)> {
        let primary_error = if self.is_degraded() {
            None
        } else {
            match self.primary.load_all().await {
                Ok(notes) => return Ok((notes, self.primary.name())),
                Err(err) => Some(self.switch_over("load", err)),
            }
        };

        let secondary = self.secondary_or_fail(&primary_error)?;
        match secondary.load_all().await {
            Ok(notes) => Ok((notes, secondary.name())),
            Err(err) => Err(self.persistence_failed(primary_error, secondary.name(), err)),
        }
    }

    /// Persist the full collection, returning the backend that took it.
    pub async fn save_all(&self, notes: &[Note]) -> Result<&'static str> {
        let primary_error = if self.is_degraded() {
            None
        } else {
            match self.primary.save_all(notes).await {
                Ok(()) => return Ok(self.primary.name()),
                Err(err) => Some(self.switch_over("save", err)),
            }
        };

        let secondary = self.secondary_or_fail(&primary_error)?;
        match secondary.save_all(notes).await {
            Ok(()) => Ok(secondary.name()),
            Err(err) => Err(self.persistence_failed(primary_error, secondary.name(), err)),
        }
    }

    fn switch_over(&self, op: &'static str, err: StorageError) -> String {
        match &self.secondary {
            Some(secondary) => {
                warn!(
                    op,
                    primary = self.primary.name(),
                    secondary = secondary.name(),
                    error = %err,
                    "Primary storage failed, switching to secondary for this session"
                );
                self.degraded.store(true, Ordering::SeqCst);
            }
            None => {
                warn!(op, primary = self.primary.name(), error = %err, "Primary storage failed");
            }
        }
        err.to_string()
    }

    fn secondary_or_fail(&self, primary_error: &Option<String>) -> Result<&dyn StorageBackend> {
        match &self.secondary {
            Some(secondary) => Ok(secondary.as_ref()),
            None => {
                let primary = primary_error.clone().unwrap_or_default();
                error!(primary = %primary, "Persistence failed with no fallback");
                Err(NotesError::PersistenceFailed {
                    primary,
                    secondary: NO_SECONDARY.to_string(),
                })
            }
        }
    }

    fn persistence_failed(
        &self,
        primary_error: Option<String>,
        secondary: &'static str,
        err: StorageError,
    ) -> NotesError {
        let primary = primary_error.unwrap_or_else(|| PRIMARY_ABANDONED.to_string());
        error!(primary = %primary, secondary, error = %err, "Persistence failed on every backend");
        NotesError::PersistenceFailed {
            primary,
            secondary: err.to_string(),
        }
    }
}
