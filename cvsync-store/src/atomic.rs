//! Atomic file writes

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::trace;

use crate::errors::{Result, StoreError};

/// Write `contents` to `path` atomically.
///
/// The data is written to a temporary file in the same directory, synced,
/// and renamed over the destination, so readers observe either the old or
/// the new content and a crash never leaves a half-written control file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::io(path, std::io::Error::other("path has no parent")))?;
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    temp.write_all(contents)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| StoreError::io(path, e))?;
    temp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    trace!(path = %path.display(), bytes = contents.len(), "wrote control file");
    Ok(())
}

/// Read a file's lines, with trailing line terminators stripped.
/// Returns `None` if the file does not exist.
pub fn read_lines(path: &Path) -> Result<Option<Vec<String>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    Ok(Some(raw.lines().map(str::to_string).collect()))
}

/// Remove a file, tolerating its absence.
pub fn remove_file_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Entries");
        write_atomic(&path, b"/a.txt/1.1///\n").unwrap();
        assert_eq!(read_lines(&path).unwrap().unwrap(), vec!["/a.txt/1.1///"]);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        assert!(read_lines(&dir.path().join("absent")).unwrap().is_none());
        remove_file_if_present(&dir.path().join("absent")).unwrap();
    }

    #[test]
    fn overwrite_is_complete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Entries");
        write_atomic(&path, b"first line that is fairly long\n").unwrap();
        write_atomic(&path, b"second\n").unwrap();
        assert_eq!(read_lines(&path).unwrap().unwrap(), vec!["second"]);
    }
}
