//! Core data structures for notes and the note index.
//!
//! A note id is `YYYYMMDDHHMMSS` followed by six random digits. The date part
//! names the daily shard file the note lives in for its whole life.
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of random digits appended to the timestamp part of an id.
const ID_SUFFIX_DIGITS: usize = 6;

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Time-ordered identifier, see [`generate_note_id`]
    pub id: String,
    /// When the note was created
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Free-text body
    pub data: String,
    /// Whether unauthenticated readers may see the note
    pub is_public: bool,
    /// Tags for organization, in the order the author gave them
    pub tags: Vec<String>,
}

impl Note {
    /// Creates a new note whose created and updated times are both `at`.
    pub fn new(
        id: String,
        at: DateTime<Utc>,
        data: String,
        is_public: bool,
        tags: Vec<String>,
    ) -> Self {
        Note {
            id,
            created_at: at,
            updated_at: at,
            data,
            is_public,
            tags,
        }
    }

    /// Lightweight index entry for this note
    pub fn meta(&self) -> NoteMeta {
        NoteMeta {
            id: self.id.clone(),
            is_public: self.is_public,
            tags: self.tags.clone(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Per-note metadata kept in the index so listings need not open shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMeta {
    pub id: String,
    pub is_public: bool,
    pub tags: Vec<String>,
}

/// The index document: shard file name -> metas, plus aggregate tag counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteIndex {
    #[serde(default)]
    pub files: BTreeMap<String, Vec<NoteMeta>>,
    #[serde(default)]
    pub tagged: BTreeMap<String, usize>,
}

impl NoteIndex {
    /// Rebuilds `tagged` from scratch out of the per-shard metas.
    pub fn recompute_tag_counts(&mut self) {
        let mut tagged = BTreeMap::new();
        for meta in self.files.values().flatten() {
            for tag in &meta.tags {
                *tagged.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        self.tagged = tagged;
    }

    /// Total number of indexed notes across all shards.
    pub fn note_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

/// Partial update applied by [`crate::NoteStorage::update_note`].
/// `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    pub data: Option<String>,
    pub is_public: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl NoteUpdate {
    /// Merges the provided fields into `note`.
    pub fn apply(self, note: &mut Note) {
        if let Some(data) = self.data {
            note.data = data;
        }
        if let Some(is_public) = self.is_public {
            note.is_public = is_public;
        }
        if let Some(tags) = self.tags {
            note.tags = tags;
        }
    }
}

/// Current UTC time truncated to milliseconds, the precision stored on disk.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Generates an id of the form `YYYYMMDDHHMMSS` + 6 random digits.
pub fn generate_note_id(at: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!(
        "{}{:0width$}",
        at.format("%Y%m%d%H%M%S"),
        suffix,
        width = ID_SUFFIX_DIGITS
    )
}

/// Extracts the calendar date encoded in an id.
///
/// Returns `None` for ids that are not all ASCII digits or whose first eight
/// digits are not a real date; such ids can never name a shard.
pub fn date_from_id(id: &str) -> Option<NaiveDate> {
    if id.len() < 8 || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(&id[..8], "%Y%m%d").ok()
}

/// Shard file name (`YYYY-MM-DD.json`) for a date.
pub fn shard_name(date: NaiveDate) -> String {
    format!("{}.json", date.format("%Y-%m-%d"))
}

/// Parses a shard file name back into its date.
///
/// Only the exact names [`shard_name`] produces are accepted, so
/// `2024-1-5.json` is not a shard.
pub fn shard_date(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(".json")?;
    let date = NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()?;
    (shard_name(date) == name).then_some(date)
}
