//! Phantom cache for deleted resources
//!
//! Sync information must survive the deletion of the resource it
//! describes, so that removal can later be reported to the repository.
//! Records are moved here by the synchronizer when a deletion is
//! prepared, and the cache materialises those resources as phantom
//! members of their parent. Phantom sync is never loaded from disk, so
//! the loaded flag is always set.

use bytes::Bytes;
use cvsync_entries::{entry_line, FolderSync};

use crate::cache::{CacheTable, CachedFolderSync, SyncInfoCache};
use crate::dirty::DirtyIndicator;
use crate::resource::Resource;

#[derive(Debug, Default)]
pub struct PhantomCache {
    table: CacheTable,
}

impl PhantomCache {
    pub fn new() -> Self {
        PhantomCache::default()
    }

    /// True if the cache holds state that makes the resource a phantom:
    /// its own sync record, a folder sync record, or phantom children.
    pub fn is_phantom(&self, resource: &Resource) -> bool {
        if self.table.sync_bytes(resource.path()).is_some() {
            return true;
        }
        if let CachedFolderSync::Cached(Some(_)) = self.table.folder_sync(resource.path()) {
            return true;
        }
        self.table.resources.lock().iter().any(|(path, state)| {
            state.sync_bytes.is_some() && path.parent().as_ref() == Some(resource.path())
        })
    }

    /// The folder's phantom children, reconstructed from their records.
    pub fn members(&self, folder: &Resource) -> Vec<Resource> {
        let mut members: Vec<Resource> = self
            .table
            .resources
            .lock()
            .iter()
            .filter(|(path, _)| path.parent().as_ref() == Some(folder.path()))
            .filter_map(|(path, state)| {
                state.sync_bytes.as_ref().map(|bytes| {
                    if entry_line::is_folder(bytes) {
                        Resource::folder(path.clone())
                    } else {
                        Resource::file(path.clone())
                    }
                })
            })
            .collect();
        members.sort();
        members
    }
}

impl SyncInfoCache for PhantomCache {
    fn sync_bytes(&self, resource: &Resource) -> Option<Bytes> {
        self.table.sync_bytes(resource.path())
    }

    fn set_sync_bytes(&self, resource: &Resource, bytes: Option<Bytes>) {
        self.table.set_sync_bytes(resource.path(), bytes);
    }

    fn folder_sync(&self, folder: &Resource) -> CachedFolderSync {
        // Phantom folder sync is only ever what was placed here, never
        // loaded, so an empty slot reads as cached-and-absent.
        match self.table.folder_sync(folder.path()) {
            CachedFolderSync::NotCached => CachedFolderSync::Cached(None),
            cached => cached,
        }
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

    fn is_sync_loaded(&self, _folder: &Resource) -> bool {
        true
    }

    fn mark_sync_loaded(&self, _folder: &Resource) {}

    fn purge(&self, folder: &Resource, deep: bool) {
        self.table.purge(folder.path(), deep);
    }

    fn purge_resource_sync(&self, resource: &Resource) {
        self.table.purge_resource_sync(resource.path());
    }
}
