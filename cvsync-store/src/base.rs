//! Pristine base copies for offline edit
//!
//! When a file is put under edit, its pristine content is copied into the
//! control directory's base subdirectory so a later unedit can restore it
//! without contacting the repository. The presence of a base copy is also
//! the "is edited" marker.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::files::CONTROL_DIR;
use crate::location::FolderLocation;

pub const BASE_DIR: &str = "Base";

fn base_path(loc: &FolderLocation, name: &str) -> PathBuf {
    loc.path().join(CONTROL_DIR).join(BASE_DIR).join(name)
}

/// True if a base copy exists for the named file.
pub fn is_edited(loc: &FolderLocation, name: &str) -> Result<bool> {
    if loc.is_linked() {
        return Ok(false);
    }
    Ok(base_path(loc, name).exists())
}

/// Copy the working file into the base directory.
pub fn copy_to_base(loc: &FolderLocation, name: &str) -> Result<()> {
    if loc.is_linked() {
        return Err(StoreError::LinkedFolderNotWritable {
            path: loc.path().to_path_buf(),
        });
    }
    let dir = loc.path().join(CONTROL_DIR).join(BASE_DIR);
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
    let target = dir.join(name);
    let source = loc.path().join(name);
    fs::copy(&source, &target).map_err(|e| StoreError::io(source, e))?;
    debug!(file = name, folder = %loc.path().display(), "copied file to base");
    Ok(())
}

/// Restore the working file from its base copy.
pub fn restore_from_base(loc: &FolderLocation, name: &str) -> Result<()> {
    if loc.is_linked() {
        return Err(StoreError::LinkedFolderNotWritable {
            path: loc.path().to_path_buf(),
        });
    }
    let source = base_path(loc, name);
    let target = loc.path().join(name);
    fs::copy(&source, &target).map_err(|e| StoreError::io(source, e))?;
    debug!(file = name, folder = %loc.path().display(), "restored file from base");
    Ok(())
}

/// Remove the base copy, tolerating its absence.
pub fn delete_base(loc: &FolderLocation, name: &str) -> Result<()> {
    if loc.is_linked() {
        return Err(StoreError::LinkedFolderNotWritable {
            path: loc.path().to_path_buf(),
        });
    }
    crate::atomic::remove_file_if_present(&base_path(loc, name))
}
