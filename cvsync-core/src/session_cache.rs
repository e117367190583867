//! Session cache for extant resources
//!
//! Holds the decoded sync state of resources that exist in the workspace.
//! A per-folder loaded flag gates disk reads: until it is set, a read of
//! any child triggers one batched load of the whole folder, so each
//! folder is read from disk once per session. External filesystem edits
//! invalidate the affected region via `purge`.

use std::sync::Arc;

use bytes::Bytes;
use cvsync_entries::FolderSync;

use crate::cache::{CacheTable, CachedFolderSync, SyncInfoCache};
use crate::dirty::DirtyIndicator;
use crate::ignore::IgnoreMatcher;
use crate::resource::Resource;

#[derive(Debug, Default)]
pub struct SessionCache {
    table: CacheTable,
}

impl SessionCache {
    pub fn new() -> Self {
        SessionCache::default()
    }

    /// The folder's compiled ignore matcher, if cached.
    pub fn folder_ignores(&self, folder: &Resource) -> Option<Arc<IgnoreMatcher>> {
        self.table
            .folders
            .lock()
            .get(folder.path())
            .and_then(|state| state.ignores.clone())
    }

    pub fn set_folder_ignores(&self, folder: &Resource, matcher: Arc<IgnoreMatcher>) {
        self.table
            .folders
            .lock()
            .entry(folder.path().clone())
            .or_default()
            .ignores = Some(matcher);
    }
}

impl SyncInfoCache for SessionCache {
    fn sync_bytes(&self, resource: &Resource) -> Option<Bytes> {
        self.table.sync_bytes(resource.path())
    }

    fn set_sync_bytes(&self, resource: &Resource, bytes: Option<Bytes>) {
        self.table.set_sync_bytes(resource.path(), bytes);
    }

    fn folder_sync(&self, folder: &Resource) -> CachedFolderSync {
        self.table.folder_sync(folder.path())
    }

    fn set_folder_sync(&self, folder: &Resource, info: Option<FolderSync>) {
        self.table.set_folder_sync(folder.path(), info);
    }

    fn dirty_indicator(&self, resource: &Resource) -> Option<DirtyIndicator> {
        self.table.dirty_indicator(resource.path())
    }

    fn set_dirty_indicator(&self, resource: &Resource, indicator: DirtyIndicator) {
        self.table.set_dirty_indicator(resource.path(), indicator);
    }

    fn flush_dirty(&self, resource: &Resource) {
        self.table.flush_dirty(resource.path());
    }

    fn is_sync_loaded(&self, folder: &Resource) -> bool {
        self.table.is_sync_loaded(folder.path())
    }

    fn mark_sync_loaded(&self, folder: &Resource) {
        self.table.mark_sync_loaded(folder.path());
    }

    fn purge(&self, folder: &Resource, deep: bool) {
        self.table.purge(folder.path(), deep);
    }

    fn purge_resource_sync(&self, resource: &Resource) {
        self.table.purge_resource_sync(resource.path());
    }
}
