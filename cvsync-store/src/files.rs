//! The six control files of a managed folder
//!
//! Layout, bit-identical to the CVS client family:
//! - `CVS/Root`: repository connection string, one line
//! - `CVS/Repository`: repository-relative path, one line
//! - `CVS/Entries`: one line per child; a trailing bare `D` marks the
//!   folder static
//! - `CVS/Tag`: sticky tag, one line
//! - `CVS/Notify`, `CVS/Baserev`: one record per line
//! - `<folder>/.cvsignore`: one pattern per line
//!
//! Reads of linked folders return `None`; sync writes to linked folders
//! are no-ops on disk (the in-memory caches above this layer may still
//! carry state for them).

use std::fs;

use bytes::Bytes;
use cvsync_entries::{BaserevInfo, CvsTag, FolderSync, NotifyInfo};
use tracing::{debug, trace};

use crate::atomic::{read_lines, remove_file_if_present, write_atomic};
use crate::errors::{Result, StoreError};
use crate::location::FolderLocation;

/// Name of the per-folder control directory.
pub const CONTROL_DIR: &str = "CVS";
pub const ROOT_FILE: &str = "Root";
pub const REPOSITORY_FILE: &str = "Repository";
pub const ENTRIES_FILE: &str = "Entries";
pub const TAG_FILE: &str = "Tag";
pub const NOTIFY_FILE: &str = "Notify";
pub const BASEREV_FILE: &str = "Baserev";
pub const IGNORE_FILE: &str = ".cvsignore";

/// A bare `D` line in the entries file marks the folder static.
const STATIC_MARKER: &str = "D";

fn control_path(loc: &FolderLocation, file: &str) -> std::path::PathBuf {
    loc.path().join(CONTROL_DIR).join(file)
}

fn ensure_control_dir(loc: &FolderLocation) -> Result<()> {
    let dir = loc.path().join(CONTROL_DIR);
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(dir, e))
}

fn skip_linked_write(loc: &FolderLocation, what: &str) -> bool {
    if loc.is_linked() {
        debug!(folder = %loc.path().display(), what, "skipping control file write for linked folder");
        return true;
    }
    false
}

/// Read the sync bytes of every child recorded in the entries file.
/// `None` if the folder has no entries file or is linked.
pub fn read_all_resource_sync(loc: &FolderLocation) -> Result<Option<Vec<Bytes>>> {
    if loc.is_linked() {
        trace!(folder = %loc.path().display(), "not reading entries of linked folder");
        return Ok(None);
    }
    let Some(lines) = read_lines(&control_path(loc, ENTRIES_FILE))? else {
        return Ok(None);
    };
    Ok(Some(
        lines
            .into_iter()
            .filter(|line| !line.is_empty() && line != STATIC_MARKER)
            .map(Bytes::from)
            .collect(),
    ))
}

/// Rewrite the entries file with the given child sync bytes, preserving
/// an existing static marker.
pub fn write_all_resource_sync(loc: &FolderLocation, infos: &[Bytes]) -> Result<()> {
    if skip_linked_write(loc, ENTRIES_FILE) {
        return Ok(());
    }
    let is_static = entries_static_marker(loc)?;
    ensure_control_dir(loc)?;
    write_entries(loc, infos, is_static)
}

fn write_entries(loc: &FolderLocation, infos: &[Bytes], is_static: bool) -> Result<()> {
    let mut contents = Vec::new();
    for info in infos {
        contents.extend_from_slice(info);
        contents.push(b'\n');
    }
    if is_static {
        contents.extend_from_slice(STATIC_MARKER.as_bytes());
        contents.push(b'\n');
    }
    write_atomic(&control_path(loc, ENTRIES_FILE), &contents)?;
    debug!(folder = %loc.path().display(), children = infos.len(), "wrote entries");
    Ok(())
}

fn entries_static_marker(loc: &FolderLocation) -> Result<bool> {
    Ok(read_lines(&control_path(loc, ENTRIES_FILE))?
        .map(|lines| lines.iter().any(|l| l == STATIC_MARKER))
        .unwrap_or(false))
}

/// Read the folder sync record. `None` if the folder is not managed
/// (no root file) or is linked.
pub fn read_folder_sync(loc: &FolderLocation) -> Result<Option<FolderSync>> {
    if loc.is_linked() {
        trace!(folder = %loc.path().display(), "not reading folder sync of linked folder");
        return Ok(None);
    }
    let Some(root_lines) = read_lines(&control_path(loc, ROOT_FILE))? else {
        return Ok(None);
    };
    let Some(root) = root_lines.into_iter().next().filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    let repository = read_lines(&control_path(loc, REPOSITORY_FILE))?
        .and_then(|lines| lines.into_iter().next())
        .unwrap_or_default();
    let tag = match read_lines(&control_path(loc, TAG_FILE))? {
        Some(lines) => match lines.first() {
            Some(line) => CvsTag::from_tag_file_line(line)?,
            None => None,
        },
        None => None,
    };
    let is_static = entries_static_marker(loc)?;
    Ok(Some(FolderSync::new(root, repository, tag, is_static)))
}

/// Write the folder sync record: root, repository, tag, and the static
/// marker in the entries file.
pub fn write_folder_sync(loc: &FolderLocation, info: &FolderSync) -> Result<()> {
    if skip_linked_write(loc, ROOT_FILE) {
        return Ok(());
    }
    ensure_control_dir(loc)?;
    write_atomic(
        &control_path(loc, ROOT_FILE),
        format!("{}\n", info.root).as_bytes(),
    )?;
    write_atomic(
        &control_path(loc, REPOSITORY_FILE),
        format!("{}\n", info.repository).as_bytes(),
    )?;
    match info.tag.as_ref().and_then(CvsTag::tag_file_line) {
        Some(line) => write_atomic(&control_path(loc, TAG_FILE), format!("{line}\n").as_bytes())?,
        None => remove_file_if_present(&control_path(loc, TAG_FILE))?,
    }
    if entries_static_marker(loc)? != info.is_static {
        let children = read_all_resource_sync(loc)?.unwrap_or_default();
        write_entries(loc, &children, info.is_static)?;
    }
    debug!(folder = %loc.path().display(), repository = %info.repository, "wrote folder sync");
    Ok(())
}

/// Delete the folder's control directory entirely.
pub fn delete_folder_sync(loc: &FolderLocation) -> Result<()> {
    if skip_linked_write(loc, CONTROL_DIR) {
        return Ok(());
    }
    let dir = loc.path().join(CONTROL_DIR);
    match fs::remove_dir_all(&dir) {
        Ok(()) => {
            debug!(folder = %loc.path().display(), "deleted control directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(dir, e)),
    }
}

/// Read the folder's ignore patterns. Blank lines are dropped here;
/// `!` semantics are applied by the matcher. `None` if there is no
/// ignore file.
pub fn read_cvs_ignore(loc: &FolderLocation) -> Result<Option<Vec<String>>> {
    if loc.is_linked() {
        return Ok(None);
    }
    Ok(read_lines(&loc.path().join(IGNORE_FILE))?
        .map(|lines| lines.into_iter().filter(|l| !l.trim().is_empty()).collect()))
}

/// Rewrite the folder's ignore file wholesale.
pub fn write_cvs_ignore(loc: &FolderLocation, patterns: &[String]) -> Result<()> {
    if skip_linked_write(loc, IGNORE_FILE) {
        return Ok(());
    }
    let mut contents = String::new();
    for pattern in patterns {
        contents.push_str(pattern);
        contents.push('\n');
    }
    write_atomic(&loc.path().join(IGNORE_FILE), contents.as_bytes())
}

/// Read every notify record of the folder. `None` if there is no notify
/// file.
pub fn read_all_notify(loc: &FolderLocation) -> Result<Option<Vec<NotifyInfo>>> {
    if loc.is_linked() {
        return Ok(None);
    }
    let Some(lines) = read_lines(&control_path(loc, NOTIFY_FILE))? else {
        return Ok(None);
    };
    lines
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| NotifyInfo::from_line(l).map_err(StoreError::from))
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Rewrite the notify file; an empty list deletes it.
pub fn write_all_notify(loc: &FolderLocation, infos: &[NotifyInfo]) -> Result<()> {
    if loc.is_linked() {
        return Err(StoreError::LinkedFolderNotWritable {
            path: loc.path().to_path_buf(),
        });
    }
    let path = control_path(loc, NOTIFY_FILE);
    if infos.is_empty() {
        return remove_file_if_present(&path);
    }
    ensure_control_dir(loc)?;
    let mut contents = String::new();
    for info in infos {
        contents.push_str(&info.to_line());
        contents.push('\n');
    }
    write_atomic(&path, contents.as_bytes())
}

/// Read every baserev record of the folder. `None` if there is no
/// baserev file.
pub fn read_all_baserev(loc: &FolderLocation) -> Result<Option<Vec<BaserevInfo>>> {
    if loc.is_linked() {
        return Ok(None);
    }
    let Some(lines) = read_lines(&control_path(loc, BASEREV_FILE))? else {
        return Ok(None);
    };
    lines
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| BaserevInfo::from_line(l).map_err(StoreError::from))
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Rewrite the baserev file; an empty list deletes it.
pub fn write_all_baserev(loc: &FolderLocation, infos: &[BaserevInfo]) -> Result<()> {
    if loc.is_linked() {
        return Err(StoreError::LinkedFolderNotWritable {
            path: loc.path().to_path_buf(),
        });
    }
    let path = control_path(loc, BASEREV_FILE);
    if infos.is_empty() {
        return remove_file_if_present(&path);
    }
    ensure_control_dir(loc)?;
    let mut contents = String::new();
    for info in infos {
        contents.push_str(&info.to_line());
        contents.push('\n');
    }
    write_atomic(&path, contents.as_bytes())
}
