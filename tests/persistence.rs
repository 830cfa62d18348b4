use notekeep_lib::config::{BackendKind, Settings};
use notekeep_lib::logging::init_logging;
use notekeep_lib::{DeleteOutcome, ImportMode, NotesApp};
use std::collections::HashSet;
use tempfile::TempDir;

fn settings(dir: &TempDir) -> Settings {
    init_logging("notekeep_lib=debug");
    Settings::in_dir(dir.path())
}

#[tokio::test]
async fn notes_survive_a_restart_on_the_record_store() {
    let dir = TempDir::new().unwrap();
    let id = {
        let app = NotesApp::open(settings(&dir)).await.unwrap();
        assert_eq!(app.active_backend().await, "record");
        let note = app.create().await.unwrap().value;
        app.save(note.id, "Groceries", "<ul><li>Milk</li></ul>").await.unwrap();
        note.id
    };

    let app = NotesApp::open(settings(&dir)).await.unwrap();
    let notes = app.list().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, id);
    assert_eq!(notes[0].title, "Groceries");
    assert_eq!(app.search("milk").await.len(), 1);
}

#[tokio::test]
async fn unreadable_record_store_falls_back_to_document() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    std::fs::write(settings.record_path(), b"this is not a database file at all").unwrap();

    let app = NotesApp::open(settings.clone()).await.unwrap();
    assert_eq!(app.active_backend().await, "document");
    let note = app.create().await.unwrap();
    assert!(note.is_persisted());

    let blob = std::fs::read_to_string(dir.path().join("notekeep.richNotes.json")).unwrap();
    assert!(blob.contains(&note.value.id.to_string()));
}

#[tokio::test]
async fn quota_failure_moves_the_session_to_the_secondary() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings(&dir);
    settings.primary = BackendKind::Document;
    settings.secondary = Some(BackendKind::Record);
    settings.quota_bytes = Some(512);

    let app = NotesApp::open(settings).await.unwrap();
    let note = app.create().await.unwrap().value;
    assert_eq!(app.active_backend().await, "document");

    let applied = app.save(note.id, "Big", &"x".repeat(2048)).await.unwrap();
    assert!(applied.is_persisted());
    assert_eq!(app.active_backend().await, "record");

    // later writes stay on the secondary even when they would fit again
    app.save(note.id, "Small", "").await.unwrap();
    assert_eq!(app.active_backend().await, "record");
}

#[tokio::test]
async fn export_then_import_round_trips() {
    let dir = TempDir::new().unwrap();
    let app = NotesApp::open(settings(&dir)).await.unwrap();
    for title in ["one", "two", "three"] {
        let note = app.create().await.unwrap().value;
        app.save(note.id, title, &format!("<p>{}</p>", title)).await.unwrap();
    }
    let before = app.list().await;

    let path = app.export_to(&dir.path().join("exports")).await.unwrap();
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("backup-notes-"));

    let other_dir = TempDir::new().unwrap();
    let other = NotesApp::open(Settings::in_dir(other_dir.path())).await.unwrap();
    let imported = other.import_file(&path, ImportMode::Replace).await.unwrap();
    assert_eq!(imported.value, 3);
    assert_eq!(other.list().await, before);

    // merging the same file again doubles the collection without id clashes
    other.import_file(&path, ImportMode::Merge).await.unwrap();
    let merged = other.list().await;
    assert_eq!(merged.len(), 6);
    let ids: HashSet<i64> = merged.iter().map(|n| n.id).collect();
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
async fn delete_is_durable() {
    let dir = TempDir::new().unwrap();
    let app = NotesApp::open(settings(&dir)).await.unwrap();
    let keep = app.create().await.unwrap().value;
    let gone = app.create().await.unwrap().value;
    assert!(matches!(app.delete(gone.id).await.unwrap(), DeleteOutcome::Deleted(_)));
    drop(app);

    let app = NotesApp::open(settings(&dir)).await.unwrap();
    let ids: Vec<i64> = app.list().await.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![keep.id]);
}
