use tracing::{error, info, warn};

/// Ephemeral per-session UI state. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    selected: Option<i64>,
    editing: bool,
}

impl Session {
    pub fn selected(&self) -> Option<i64> {
        self.selected
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn select(&mut self, id: i64) {
        self.selected = Some(id);
        self.editing = false;
    }

    /// Returns false when nothing is selected.
    pub fn begin_edit(&mut self) -> bool {
        self.editing = self.selected.is_some();
        self.editing
    }

    pub fn end_edit(&mut self) {
        self.editing = false;
    }

    pub fn clear(&mut self) {
        self.selected = None;
        self.editing = false;
    }

    /// Drop the selection if it points at `id`.
    pub fn forget(&mut self, id: i64) {
        if self.selected == Some(id) {
            self.clear();
        }
    }
}

/// What the core needs from the rich-text editing surface: the text
/// currently in the title field and the editor's markup.
pub trait EditorSurface: Send + Sync {
    fn title(&self) -> String;
    fn content(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing notification channel.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Notifier that only writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info | NoticeLevel::Success => info!(?level, "{}", message),
            NoticeLevel::Warning => warn!("{}", message),
            NoticeLevel::Error => error!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_requires_selection() {
        let mut session = Session::default();
        assert!(!session.begin_edit());
        session.select(4);
        assert!(session.begin_edit());
        assert!(session.is_editing());
    }

    #[test]
    fn test_forget_only_matching() {
        let mut session = Session::default();
        session.select(4);
        session.begin_edit();
        session.forget(5);
        assert_eq!(session.selected(), Some(4));
        session.forget(4);
        assert_eq!(session.selected(), None);
        assert!(!session.is_editing());
    }
}
