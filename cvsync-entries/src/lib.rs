//! Sync record types and the entry-line codec
//!
//! This crate provides the canonical byte encoding used by the CVS client
//! family for per-resource synchronization records, together with the plain
//! record types layered on top of it:
//! - Entry-line codec over raw sync bytes (`entry_line`)
//! - Per-resource sync records (`ResourceSync`)
//! - Per-folder sync records (`FolderSync`)
//! - Sticky tags (`CvsTag`)
//! - Edit/notify and base-revision side records (`NotifyInfo`, `BaserevInfo`)

pub mod baserev;
pub mod entry_line;
pub mod errors;
pub mod folder_sync;
pub mod notify;
pub mod resource_sync;
pub mod tag;

pub use baserev::BaserevInfo;
pub use errors::{EntriesError, Result};
pub use folder_sync::FolderSync;
pub use notify::{NotifyInfo, NotifyKind};
pub use resource_sync::{KeywordMode, ResourceSync, ADDED_REVISION};
pub use tag::{CvsTag, TagKind};
