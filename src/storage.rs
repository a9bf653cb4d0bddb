use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{Datelike, TimeDelta};
use log::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use crate::{
    date_from_id, generate_note_id, now_millis, read_json_file, shard_date, shard_name,
    write_json_atomic, BlogError, Config, ListNotesOptions, Note, NoteIndex, NotePage,
    NoteUpdate, RebuildIndexSummary, Result,
};

/// File-backed note store: one JSON array per calendar day plus an index.
///
/// Every mutation writes the shard first and the index second. Each write is
/// atomic on its own; the pair is not, and [`NoteStorage::rebuild_index`]
/// repairs an index left behind by a crash between the two.
pub struct NoteStorage {
    /// Application configuration
    config: Config,
}

impl NoteStorage {
    /// Creates a new NoteStorage instance with the provided configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Ensures the notes directory exists.
    pub fn initialize(&self) -> Result<()> {
        info!(
            "Initializing NoteStorage with notes_dir={}",
            self.config.notes_dir.display()
        );

        if !self.config.notes_dir.exists() {
            debug!(
                "Notes directory does not exist, creating: {}",
                self.config.notes_dir.display()
            );
            fs::create_dir_all(&self.config.notes_dir).map_err(|e| {
                error!("Failed to create notes directory: {}", e);
                BlogError::DirectoryError {
                    path: self.config.notes_dir.clone(),
                }
            })?;
        }

        Ok(())
    }

    pub fn notes_dir(&self) -> &Path {
        &self.config.notes_dir
    }

    fn shard_path(&self, shard: &str) -> PathBuf {
        self.config.notes_dir.join(shard)
    }

    /// Reads the index. A missing or unparseable index reads as empty.
    pub fn read_index(&self) -> Result<NoteIndex> {
        let path = self.config.index_path();
        match read_json_file::<NoteIndex>(&path) {
            Ok(Some(index)) => Ok(index),
            Ok(None) => Ok(NoteIndex::default()),
            Err(BlogError::Serialization(e)) => {
                warn!(
                    "Index {} is unreadable ({}), treating it as empty",
                    path.display(),
                    e
                );
                Ok(NoteIndex::default())
            }
            Err(e) => Err(e),
        }
    }

    fn write_index(&self, index: &NoteIndex) -> Result<()> {
        trace!("Writing index with {} shards", index.files.len());
        write_json_atomic(&self.config.index_path(), index)
    }

    /// Loads a shard. A missing shard is empty; a shard that fails to parse
    /// is an error so that nothing overwrites it.
    fn read_shard(&self, shard: &str) -> Result<Vec<Note>> {
        let path = self.shard_path(shard);
        match read_json_file::<Vec<Note>>(&path) {
            Ok(notes) => Ok(notes.unwrap_or_default()),
            Err(BlogError::Serialization(e)) => {
                error!("Shard {} is corrupt: {}", path.display(), e);
                Err(BlogError::CorruptShard {
                    path,
                    message: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn write_shard(&self, shard: &str, notes: &[Note]) -> Result<()> {
        debug!("Writing {} notes to shard {}", notes.len(), shard);
        write_json_atomic(&self.shard_path(shard), &notes)
    }

    /// Creates a note in today's shard and indexes it.
    pub fn create_note(&self, data: String, is_public: bool, tags: Vec<String>) -> Result<Note> {
        let now = now_millis();
        let shard = shard_name(now.date_naive());
        let mut notes = self.read_shard(&shard)?;

        let mut id = generate_note_id(now);
        while notes.iter().any(|n| n.id == id) {
            trace!("Regenerating colliding note id {}", id);
            id = generate_note_id(now);
        }

        let note = Note::new(id, now, data, is_public, tags);
        notes.push(note.clone());
        self.write_shard(&shard, &notes)?;

        let mut index = self.read_index()?;
        index.files.entry(shard).or_default().push(note.meta());
        index.recompute_tag_counts();
        self.write_index(&index)?;

        info!("Note created: {}", note.id);
        Ok(note)
    }

    /// Retrieves a note by its ID.
    /// Returns Ok(None) when the id is malformed or no such note exists.
    pub fn get_note(&self, note_id: &str) -> Result<Option<Note>> {
        debug!("Retrieving note by ID: {}", note_id);
        let Some(date) = date_from_id(note_id) else {
            debug!("Note id does not encode a date: {}", note_id);
            return Ok(None);
        };

        let note = self
            .read_shard(&shard_name(date))?
            .into_iter()
            .find(|n| n.id == note_id);

        if note.is_none() {
            debug!("Note not found: {}", note_id);
        }
        Ok(note)
    }

    /// Merges `changes` into an existing note and refreshes its index entry.
    pub fn update_note(&self, note_id: &str, changes: NoteUpdate) -> Result<Note> {
        info!("Updating note: {}", note_id);
        let not_found = || BlogError::NoteNotFound {
            id: note_id.to_string(),
        };

        let date = date_from_id(note_id).ok_or_else(not_found)?;
        let shard = shard_name(date);
        let mut notes = self.read_shard(&shard)?;
        let note = notes
            .iter_mut()
            .find(|n| n.id == note_id)
            .ok_or_else(|| {
                error!("Cannot update note {}: Note not found", note_id);
                not_found()
            })?;

        let previous = note.updated_at;
        changes.apply(note);
        let now = now_millis();
        note.updated_at = if now > previous {
            now
        } else {
            previous + TimeDelta::milliseconds(1)
        };
        let updated = note.clone();
        self.write_shard(&shard, &notes)?;

        let mut index = self.read_index()?;
        let metas = index.files.entry(shard).or_default();
        match metas.iter_mut().find(|m| m.id == note_id) {
            Some(meta) => *meta = updated.meta(),
            None => {
                warn!("Note {} was missing from the index, re-adding it", note_id);
                metas.push(updated.meta());
            }
        }
        index.recompute_tag_counts();
        self.write_index(&index)?;

        info!("Note updated successfully: {}", note_id);
        Ok(updated)
    }

    /// Removes a note. An emptied shard loses both its file and its index key.
    pub fn delete_note(&self, note_id: &str) -> Result<()> {
        info!("Deleting note: {}", note_id);
        let not_found = || BlogError::NoteNotFound {
            id: note_id.to_string(),
        };

        let date = date_from_id(note_id).ok_or_else(not_found)?;
        let shard = shard_name(date);
        let mut notes = self.read_shard(&shard)?;
        let position = notes.iter().position(|n| n.id == note_id).ok_or_else(|| {
            warn!("Cannot delete note {}: Note not found", note_id);
            not_found()
        })?;
        notes.remove(position);

        if notes.is_empty() {
            let path = self.shard_path(&shard);
            debug!("Shard {} is now empty, removing it", path.display());
            fs::remove_file(&path).map_err(|e| {
                error!("Failed to remove shard {}: {}", path.display(), e);
                BlogError::Io(e)
            })?;
        } else {
            self.write_shard(&shard, &notes)?;
        }

        let mut index = self.read_index()?;
        if let Some(metas) = index.files.get_mut(&shard) {
            metas.retain(|m| m.id != note_id);
            if metas.is_empty() {
                index.files.remove(&shard);
            }
        }
        index.recompute_tag_counts();
        self.write_index(&index)?;

        info!("Note deleted: {}", note_id);
        Ok(())
    }

    /// Lists notes newest first with optional tag and visibility filters.
    ///
    /// Loads every indexed shard on each call; the store is meant for a
    /// personal-blog sized corpus.
    pub fn list_notes(&self, options: ListNotesOptions) -> Result<NotePage> {
        let options = options.normalized();
        debug!("Listing notes with {:?}", options);

        let index = self.read_index()?;
        let mut all_notes = Vec::with_capacity(index.note_count());
        for shard in index.files.keys().rev() {
            all_notes.extend(self.read_shard(shard)?);
        }

        all_notes.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let filtered: Vec<Note> = all_notes
            .into_iter()
            .filter(|note| options.tag.as_deref().map_or(true, |tag| note.has_tag(tag)))
            .filter(|note| options.is_public.map_or(true, |p| note.is_public == p))
            .collect();

        let total = filtered.len();
        let start = (options.page - 1).saturating_mul(options.page_size);
        let notes = filtered
            .into_iter()
            .skip(start)
            .take(options.page_size)
            .collect();

        Ok(NotePage {
            notes,
            total,
            page: options.page,
            page_size: options.page_size,
        })
    }

    /// Per-day note counts for one month, from index metadata only.
    pub fn month_stats(
        &self,
        year: i32,
        month: u32,
        public_only: bool,
    ) -> Result<BTreeMap<String, usize>> {
        let index = self.read_index()?;
        let stats = index
            .files
            .iter()
            .filter_map(|(shard, metas)| {
                let date = shard_date(shard)?;
                if date.year() != year || date.month() != month {
                    return None;
                }
                let count = metas.iter().filter(|m| !public_only || m.is_public).count();
                (count > 0).then(|| (date.format("%Y-%m-%d").to_string(), count))
            })
            .collect();
        Ok(stats)
    }

    /// Regenerates the whole index from the shard files on disk.
    pub fn rebuild_index(&self) -> Result<RebuildIndexSummary> {
        info!(
            "Rebuilding index from shards in {}",
            self.config.notes_dir.display()
        );
        let mut summary = RebuildIndexSummary::default();
        let mut index = NoteIndex::default();

        for entry in WalkDir::new(&self.config.notes_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !entry.path().is_file() || shard_date(&name).is_none() {
                continue;
            }

            summary.shards_scanned += 1;
            match self.read_shard(&name) {
                Ok(notes) if notes.is_empty() => {}
                Ok(notes) => {
                    summary.notes_indexed += notes.len();
                    index
                        .files
                        .insert(name, notes.iter().map(Note::meta).collect());
                }
                Err(e) => {
                    warn!("Skipping shard {}: {}", name, e);
                    summary.shards_skipped.push((name, e.to_string()));
                }
            }
        }

        index.recompute_tag_counts();
        self.write_index(&index)?;

        info!(
            "Index rebuilt: {} notes across {} shards ({} skipped)",
            summary.notes_indexed,
            index.files.len(),
            summary.shards_skipped.len()
        );
        Ok(summary)
    }
}
