//! Raw codec over sync bytes
//!
//! Sync bytes are the exact byte content of one entry line from a folder's
//! control directory: `/name/revision/timestamp/options/tag` for a file,
//! `D/name////` for a folder. All functions here operate on the raw bytes
//! without building a record, so callers that only need one field never pay
//! for a full parse, and values passed through unmodified keep bit-identity
//! with the on-disk format.

use std::ops::Range;

use bytes::Bytes;

use crate::errors::{EntriesError, Result};
use crate::resource_sync::KeywordMode;
use crate::tag::CvsTag;

pub(crate) const SEPARATOR: u8 = b'/';
pub(crate) const FOLDER_PREFIX: u8 = b'D';
pub(crate) const DELETION_PREFIX: u8 = b'-';

const SLOT_NAME: usize = 0;
const SLOT_REVISION: usize = 1;
const SLOT_TIMESTAMP: usize = 2;
const SLOT_OPTIONS: usize = 3;
const SLOT_TAG: usize = 4;

/// True if the sync bytes describe a folder.
pub fn is_folder(bytes: &[u8]) -> bool {
    bytes.first() == Some(&FOLDER_PREFIX)
}

/// Locate the five slots of an entry line.
///
/// File lines must carry all five separators. Folder lines may omit
/// trailing empty slots, which some clients in the wild do.
fn slots(bytes: &[u8]) -> Result<[Range<usize>; 5]> {
    let folder = is_folder(bytes);
    let lead = usize::from(folder);
    if bytes.get(lead) != Some(&SEPARATOR) {
        return Err(EntriesError::malformed(lead, "expected '/' separator"));
    }
    let mut ranges: [Range<usize>; 5] = [0..0, 0..0, 0..0, 0..0, 0..0];
    let mut start = lead + 1;
    for (index, range) in ranges.iter_mut().enumerate() {
        let end = if index == SLOT_TAG {
            // The tag slot runs to the end of the line.
            bytes.len()
        } else {
            match bytes[start.min(bytes.len())..].iter().position(|&b| b == SEPARATOR) {
                Some(pos) => start + pos,
                None if folder => bytes.len(),
                None => {
                    return Err(EntriesError::malformed(bytes.len(), "truncated sync record"));
                }
            }
        };
        *range = start.min(bytes.len())..end;
        start = end + 1;
    }
    Ok(ranges)
}

fn slot_str(bytes: &[u8], slot: usize) -> Result<&str> {
    let range = slots(bytes)?[slot].clone();
    std::str::from_utf8(&bytes[range.clone()])
        .map_err(|_| EntriesError::malformed(range.start, "slot is not valid UTF-8"))
}

/// The resource name recorded in the sync bytes.
pub fn name_of(bytes: &[u8]) -> Result<&str> {
    let name = slot_str(bytes, SLOT_NAME)?;
    if name.is_empty() {
        return Err(EntriesError::malformed(
            usize::from(is_folder(bytes)) + 1,
            "empty resource name",
        ));
    }
    Ok(name)
}

/// The revision, with any deletion prefix stripped.
pub fn revision_of(bytes: &[u8]) -> Result<&str> {
    let raw = slot_str(bytes, SLOT_REVISION)?;
    Ok(raw.strip_prefix('-').unwrap_or(raw))
}

/// The raw timestamp slot. Empty for folders and freshly added files.
pub fn timestamp_of(bytes: &[u8]) -> Result<&str> {
    slot_str(bytes, SLOT_TIMESTAMP)
}

/// The raw keyword-substitution options slot, e.g. `-kb`.
pub fn options_of(bytes: &[u8]) -> Result<&str> {
    slot_str(bytes, SLOT_OPTIONS)
}

/// The keyword-substitution mode recorded in the sync bytes.
pub fn keyword_mode_of(bytes: &[u8]) -> Result<KeywordMode> {
    Ok(KeywordMode::from_entry_slot(options_of(bytes)?))
}

/// The sticky tag recorded in the sync bytes, if any.
pub fn tag_of(bytes: &[u8]) -> Result<Option<CvsTag>> {
    CvsTag::from_entry_slot(slot_str(bytes, SLOT_TAG)?)
        .map_err(|_| match slots(bytes) {
            Ok(ranges) => EntriesError::malformed(ranges[SLOT_TAG].start, "unknown tag kind"),
            Err(e) => e,
        })
}

/// True if the record describes a just-added resource (sentinel revision).
pub fn is_addition(bytes: &[u8]) -> Result<bool> {
    Ok(revision_of(bytes)? == crate::resource_sync::ADDED_REVISION)
}

/// True if the record is in deletion form (revision prefixed with `-`).
pub fn is_deletion(bytes: &[u8]) -> Result<bool> {
    let raw = slot_str(bytes, SLOT_REVISION)?;
    Ok(raw.as_bytes().first() == Some(&DELETION_PREFIX))
}

/// Rewrite the record into deletion form. Idempotent.
pub fn convert_to_deletion(bytes: &[u8]) -> Result<Bytes> {
    if is_deletion(bytes)? {
        return Ok(Bytes::copy_from_slice(bytes));
    }
    let range = slots(bytes)?[SLOT_REVISION].clone();
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.extend_from_slice(&bytes[..range.start]);
    out.push(DELETION_PREFIX);
    out.extend_from_slice(&bytes[range.start..]);
    Ok(Bytes::from(out))
}

/// Strip the deletion prefix from the record. Idempotent.
pub fn convert_from_deletion(bytes: &[u8]) -> Result<Bytes> {
    if !is_deletion(bytes)? {
        return Ok(Bytes::copy_from_slice(bytes));
    }
    let range = slots(bytes)?[SLOT_REVISION].clone();
    let mut out = Vec::with_capacity(bytes.len() - 1);
    out.extend_from_slice(&bytes[..range.start]);
    out.extend_from_slice(&bytes[range.start + 1..]);
    Ok(Bytes::from(out))
}

/// Replace the revision slot, preserving every other byte.
pub fn set_revision(bytes: &[u8], revision: &str) -> Result<Bytes> {
    let range = slots(bytes)?[SLOT_REVISION].clone();
    let mut out = Vec::with_capacity(bytes.len() - range.len() + revision.len());
    out.extend_from_slice(&bytes[..range.start]);
    out.extend_from_slice(revision.as_bytes());
    out.extend_from_slice(&bytes[range.end..]);
    Ok(Bytes::from(out))
}

/// The canonical sync bytes for a folder child entry.
pub fn folder_line(name: &str) -> Bytes {
    Bytes::from(format!("D/{name}////"))
}
