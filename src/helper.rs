use std::{fs, io::Write, path::Path};

use log::{debug, error, trace};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use crate::{BlogError, Result};

/// Reads and parses a JSON document, returning `None` when the file is absent.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    debug!("Loading JSON from file: {}", path.display());
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            trace!("File does not exist: {}", path.display());
            return Ok(None);
        }
        Err(e) => {
            error!("Failed to open file {}: {}", path.display(), e);
            return Err(BlogError::Io(e));
        }
    };

    let value = serde_json::from_str(&content)?;
    Ok(Some(value))
}

/// Writes `value` as pretty JSON through a temporary file in the same
/// directory, then atomically moves it over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    if !dir.exists() {
        debug!("Creating parent directory: {}", dir.display());
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create directory {}: {}", dir.display(), e);
            BlogError::DirectoryError {
                path: dir.to_path_buf(),
            }
        })?;
    }

    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
        error!("Failed to create temporary file: {}", e);
        BlogError::Io(e)
    })?;

    trace!("Serializing to JSON for {}", path.display());
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        error!("Failed to serialize {}: {}", path.display(), e);
        BlogError::Serialization(e)
    })?;

    temp_file.write_all(json.as_bytes()).map_err(|e| {
        error!("Failed to write to temporary file: {}", e);
        BlogError::Io(e)
    })?;
    temp_file.flush()?;

    temp_file.persist(path).map_err(|e| {
        error!("Failed to persist file {}: {}", path.display(), e.error);
        BlogError::Io(e.error)
    })?;

    trace!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Vec<u32>> = read_json_file(&dir.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn atomic_write_creates_parent_and_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![4]).unwrap();

        let value: Option<Vec<u32>> = read_json_file(&path).unwrap();
        assert_eq!(value, Some(vec![4]));
    }
}
