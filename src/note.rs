use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Title given to freshly created notes.
pub const NEW_NOTE_TITLE: &str = "New Note";

/// Title used when a note is saved or imported without one.
pub const UNTITLED_TITLE: &str = "Untitled Note";

/// Characters shown in a list preview before it is cut.
pub const PREVIEW_CHARS: usize = 80;

// Full note record, the only thing that gets persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// An empty note stamped with `now` for both timestamps.
    pub fn new(id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: NEW_NOTE_TITLE.to_string(),
            content: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the content has no visible text. Empty notes are still
    /// regular records; only the preview treats them differently.
    pub fn is_empty(&self) -> bool {
        plain_text(&self.content).is_empty()
    }

    pub fn matches(&self, term_lower: &str) -> bool {
        self.title.to_lowercase().contains(term_lower)
            || plain_text(&self.content).to_lowercase().contains(term_lower)
    }

    pub fn metadata(&self) -> NoteMetadata {
        NoteMetadata {
            id: self.id,
            title: self.title.clone(),
            preview: preview(&self.content),
            updated_at: self.updated_at,
        }
    }

    pub fn stats(&self) -> NoteStats {
        NoteStats::of(&self.content)
    }
}

// Note metadata for list display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMetadata {
    pub id: i64,
    pub title: String,
    /// `None` for an empty note
    pub preview: Option<String>,
    #[serde(with = "iso8601")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NoteStats {
    pub words: usize,
    pub chars: usize,
}

impl NoteStats {
    pub fn of(markup: &str) -> Self {
        let text = plain_text(markup);
        Self {
            words: text.split_whitespace().count(),
            chars: text.chars().count(),
        }
    }
}

/// Time-derived id source. Ids are the current unix time in milliseconds,
/// bumped past the last issued id when the clock has not advanced.
#[derive(Debug, Default)]
pub struct IdSource {
    last: i64,
}

impl IdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for which `taken` is false. Once the clock-derived value
    /// reaches `i64::MAX` the free ids below it are handed out instead.
    /// `None` only when every id is taken.
    pub fn next(&mut self, taken: impl Fn(i64) -> bool) -> Option<i64> {
        let now = Utc::now().timestamp_millis();
        let id = free_id(now.max(self.last.saturating_add(1)), taken)?;
        self.last = self.last.max(id);
        Some(id)
    }

    /// Make sure every later `next()` is greater than `id`, while there is room.
    pub fn observe(&mut self, id: i64) {
        self.last = self.last.max(id);
    }
}

/// First id at or above `start` that is not `taken`, else the closest one
/// below it.
pub fn free_id(start: i64, taken: impl Fn(i64) -> bool) -> Option<i64> {
    let mut candidate = Some(start);
    while let Some(id) = candidate {
        if !taken(id) {
            return Some(id);
        }
        candidate = id.checked_add(1);
    }
    let mut candidate = start.checked_sub(1);
    while let Some(id) = candidate {
        if !taken(id) {
            return Some(id);
        }
        candidate = id.checked_sub(1);
    }
    None
}

/// Current time at millisecond precision, the precision stored timestamps keep.
pub fn now() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Trimmed title, or the placeholder when nothing is left.
pub fn title_or_placeholder(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        UNTITLED_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

fn tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// Text of a rich-text fragment with markup removed.
pub fn plain_text(markup: &str) -> String {
    let stripped = tag_regex().replace_all(markup, "");
    // &amp; last so "&amp;lt;" stays "&lt;"
    stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

// Utility: Generate preview from content
pub fn preview(markup: &str) -> Option<String> {
    let text = plain_text(markup);
    if text.is_empty() {
        return None;
    }
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        Some(format!("{}...", cut))
    } else {
        Some(text)
    }
}

/// Stable sort, newest `updated_at` first. Notes with equal timestamps
/// keep their relative order.
pub fn sort_by_recency(notes: &mut [Note]) {
    notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|ts| super::truncate_millis(ts.with_timezone(&Utc)))
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_id_source_is_strictly_increasing() {
        let mut ids = IdSource::new();
        let mut last = ids.next(|_| false).unwrap();
        for _ in 0..1000 {
            let id = ids.next(|_| false).unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_id_source_observe_raises_floor() {
        let mut ids = IdSource::new();
        let far_future = Utc::now().timestamp_millis() + 1_000_000;
        ids.observe(far_future);
        assert_eq!(ids.next(|_| false), Some(far_future + 1));
    }

    #[test]
    fn test_id_source_at_the_top_reuses_free_ids_below() {
        let mut ids = IdSource::new();
        ids.observe(i64::MAX);
        let taken = [i64::MAX, i64::MAX - 1];
        assert_eq!(ids.next(|id| taken.contains(&id)), Some(i64::MAX - 2));
        // still at the top, the next call keeps searching downwards
        let taken = [i64::MAX, i64::MAX - 1, i64::MAX - 2];
        assert_eq!(ids.next(|id| taken.contains(&id)), Some(i64::MAX - 3));
    }

    #[test]
    fn test_free_id_skips_taken_and_never_overflows() {
        assert_eq!(free_id(3, |id| id == 3 || id == 4), Some(5));
        assert_eq!(free_id(i64::MAX, |_| false), Some(i64::MAX));
        assert_eq!(free_id(i64::MAX, |id| id > i64::MAX - 3), Some(i64::MAX - 3));
        assert_eq!(free_id(i64::MIN, |id| id == i64::MIN), Some(i64::MIN + 1));
    }

    #[test]
    fn test_plain_text_strips_tags_and_entities() {
        assert_eq!(plain_text("<b>Hello World</b>"), "Hello World");
        assert_eq!(plain_text("<p>a &amp;lt; b</p>"), "a &lt; b");
        assert_eq!(plain_text("  <br>  "), "");
    }

    #[test]
    fn test_preview_cut_and_empty() {
        assert_eq!(preview("<p></p>"), None);
        assert_eq!(preview("<i>short</i>").as_deref(), Some("short"));

        let long = "x".repeat(100);
        let p = preview(&long).unwrap();
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn test_stats() {
        let stats = NoteStats::of("<p>one two</p> <b>three</b>");
        assert_eq!(stats.words, 3);
        assert_eq!(NoteStats::of("").words, 0);
        assert_eq!(NoteStats::of("<i>héllo</i>").chars, 5);
    }

    #[test]
    fn test_title_placeholder() {
        assert_eq!(title_or_placeholder("   "), UNTITLED_TITLE);
        assert_eq!(title_or_placeholder("  Groceries "), "Groceries");
    }

    #[test]
    fn test_matches_is_case_insensitive_on_plain_text() {
        let mut note = Note::new(1, at(0));
        note.content = "<b>Hello World</b>".to_string();
        assert!(note.matches("hello"));
        assert!(note.matches("new note"));
        // tag names are not content
        assert!(!note.matches("<b>"));
    }

    #[test]
    fn test_sort_by_recency_is_stable() {
        let mut a = Note::new(1, at(10));
        a.title = "a".into();
        let mut b = Note::new(2, at(20));
        b.title = "b".into();
        let mut c = Note::new(3, at(10));
        c.title = "c".into();
        let mut notes = vec![a, b, c];
        sort_by_recency(&mut notes);
        let ids: Vec<i64> = notes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_timestamp_format() {
        let note = Note::new(7, at(1_700_000_000));
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["createdAt"], "2023-11-14T22:13:20.000Z");
        assert_eq!(json["updatedAt"], "2023-11-14T22:13:20.000Z");
        let back: Note = serde_json::from_value(json).unwrap();
        assert_eq!(back, note);
    }
}
