//! Import reconciliation and the export file format.
//!
//! Exported files are a pretty-printed JSON array of notes. Imports accept the
//! same shape and are lenient about individual fields; only a top-level value
//! that is not an array of records is rejected.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{NotesError, Result};
use crate::note::{self, free_id, iso8601, Note, UNTITLED_TITLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// The imported collection becomes the whole collection
    Replace,
    /// Imported notes are appended, colliding ids are rewritten
    Merge,
}

/// Combine `incoming` with `current`.
///
/// `Merge` keeps every incoming id that is free. An id already used by
/// `current`, or by an earlier incoming note, is rewritten to the next free
/// value counting up from `max(current ids, 0) + 1`, skipping every id either
/// side uses. At the top of the id range the free ids below the start are
/// used instead. The result is `current` followed by `incoming`.
pub fn reconcile(current: &[Note], incoming: Vec<Note>, mode: ImportMode) -> Result<Vec<Note>> {
    match mode {
        ImportMode::Replace => Ok(incoming),
        ImportMode::Merge => {
            let current_ids: HashSet<i64> = current.iter().map(|n| n.id).collect();
            let incoming_ids: HashSet<i64> = incoming.iter().map(|n| n.id).collect();
            let mut seen: HashSet<i64> = HashSet::new();
            let mut next = current_ids
                .iter()
                .copied()
                .max()
                .unwrap_or(0)
                .max(0)
                .saturating_add(1);

            let mut merged = current.to_vec();
            merged.reserve(incoming.len());
            for mut note in incoming {
                if current_ids.contains(&note.id) || seen.contains(&note.id) {
                    note.id = free_id(next, |id| {
                        current_ids.contains(&id) || incoming_ids.contains(&id) || seen.contains(&id)
                    })
                    .ok_or(NotesError::IdsExhausted)?;
                    next = note.id.saturating_add(1);
                }
                seen.insert(note.id);
                merged.push(note);
            }
            Ok(merged)
        }
    }
}

/// Parse an import payload into notes with pairwise distinct ids.
///
/// Missing fields get defaults: placeholder title, empty content, `now` for
/// `createdAt`, `createdAt` for `updatedAt`. Records without a usable id, or
/// repeating an id seen earlier in the file, get `max id in file + 1, +2, ...`.
pub fn parse_import(raw: &str) -> Result<Vec<Note>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| NotesError::invalid_import(format!("not valid JSON: {}", e)))?;
    let Value::Array(entries) = value else {
        return Err(NotesError::invalid_import("top-level value is not an array"));
    };

    let now = note::now();
    let mut ids = Vec::with_capacity(entries.len());
    let mut notes = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let Value::Object(record) = entry else {
            return Err(NotesError::invalid_import(format!(
                "entry {} is not a note record",
                index
            )));
        };
        ids.push(record.get("id").and_then(id_value));
        notes.push(note_from_record(&record, now));
    }

    for (note, id) in notes.iter_mut().zip(assign_ids(&ids)?) {
        note.id = id;
    }
    Ok(notes)
}

/// Resolve ids so they are pairwise distinct. The first holder of an id keeps
/// it; missing and repeated ids take fresh values above the largest one, or
/// free values below it once the top of the range is reached.
pub fn assign_ids(ids: &[Option<i64>]) -> Result<Vec<i64>> {
    let present: HashSet<i64> = ids.iter().flatten().copied().collect();
    let mut next = present
        .iter()
        .copied()
        .max()
        .unwrap_or(0)
        .max(0)
        .saturating_add(1);
    let mut seen = HashSet::with_capacity(ids.len());

    ids.iter()
        .map(|id| match id {
            Some(id) if seen.insert(*id) => Ok(*id),
            _ => {
                let fresh = free_id(next, |id| present.contains(&id) || seen.contains(&id))
                    .ok_or(NotesError::IdsExhausted)?;
                seen.insert(fresh);
                next = fresh.saturating_add(1);
                Ok(fresh)
            }
        })
        .collect()
}

fn note_from_record(record: &Map<String, Value>, now: DateTime<Utc>) -> Note {
    let title = match record.get("title").and_then(Value::as_str) {
        Some(title) if !title.trim().is_empty() => title.to_string(),
        _ => UNTITLED_TITLE.to_string(),
    };
    let content = record
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let created_at = record.get("createdAt").and_then(timestamp_value).unwrap_or(now);
    let updated_at = record
        .get("updatedAt")
        .and_then(timestamp_value)
        .unwrap_or(created_at)
        .max(created_at);

    Note {
        id: 0,
        title,
        content,
        created_at,
        updated_at,
    }
}

fn id_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// ISO-8601 text or unix milliseconds.
fn timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => iso8601::parse(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

pub fn export_json(notes: &[Note]) -> Result<String> {
    serde_json::to_string_pretty(notes).map_err(|e| NotesError::Io(e.into()))
}

/// `<prefix>-<YYYY-MM-DD>.json`
pub fn export_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}.json", prefix, date.format("%Y-%m-%d"))
}
