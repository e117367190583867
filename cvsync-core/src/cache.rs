//! Shared shape of the in-memory sync caches
//!
//! The synchronizer routes every cached read or write through one of two
//! caches with the same interface: the session cache for resources that
//! exist, and the phantom cache for deleted resources whose sync must
//! survive. All access happens under the synchronizer's op lock; the
//! interior mutexes here make each individual step safe on their own.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use cvsync_entries::FolderSync;
use parking_lot::Mutex;

use crate::dirty::DirtyIndicator;
use crate::ignore::IgnoreMatcher;
use crate::resource::{Resource, ResourcePath};

/// A folder-sync slot: distinguishes "never loaded" from "loaded and
/// known absent".
#[derive(Debug, Clone, PartialEq)]
pub enum CachedFolderSync {
    NotCached,
    Cached(Option<FolderSync>),
}

/// Common interface of the session and phantom caches.
pub trait SyncInfoCache: Send + Sync {
    fn sync_bytes(&self, resource: &Resource) -> Option<Bytes>;
    fn set_sync_bytes(&self, resource: &Resource, bytes: Option<Bytes>);
    fn folder_sync(&self, folder: &Resource) -> CachedFolderSync;
    fn set_folder_sync(&self, folder: &Resource, info: Option<FolderSync>);
    fn dirty_indicator(&self, resource: &Resource) -> Option<DirtyIndicator>;
    fn set_dirty_indicator(&self, resource: &Resource, indicator: DirtyIndicator);
    /// Forget the resource's dirty indicator entirely.
    fn flush_dirty(&self, resource: &Resource);
    /// True once the sync records of the folder's children are cached.
    fn is_sync_loaded(&self, folder: &Resource) -> bool;
    fn mark_sync_loaded(&self, folder: &Resource);
    /// Drop cached state under the folder: its own folder slots plus its
    /// children's records; `deep` extends to the whole subtree.
    fn purge(&self, folder: &Resource, deep: bool);
    /// Drop the resource's own cached sync record.
    fn purge_resource_sync(&self, resource: &Resource);
}

#[derive(Debug, Default)]
pub(crate) struct FolderState {
    pub folder_sync: Option<Option<FolderSync>>,
    pub sync_loaded: bool,
    pub ignores: Option<Arc<IgnoreMatcher>>,
}

#[derive(Debug, Default)]
pub(crate) struct ResourceState {
    pub sync_bytes: Option<Bytes>,
    pub dirty: Option<DirtyIndicator>,
}

/// Backing tables shared by both cache implementations.
#[derive(Debug, Default)]
pub(crate) struct CacheTable {
    pub folders: Mutex<HashMap<ResourcePath, FolderState>>,
    pub resources: Mutex<HashMap<ResourcePath, ResourceState>>,
}

impl CacheTable {
    pub fn sync_bytes(&self, path: &ResourcePath) -> Option<Bytes> {
        self.resources
            .lock()
            .get(path)
            .and_then(|state| state.sync_bytes.clone())
    }

    pub fn set_sync_bytes(&self, path: &ResourcePath, bytes: Option<Bytes>) {
        self.resources.lock().entry(path.clone()).or_default().sync_bytes = bytes;
    }

    pub fn folder_sync(&self, path: &ResourcePath) -> CachedFolderSync {
        match self.folders.lock().get(path).and_then(|s| s.folder_sync.clone()) {
            Some(info) => CachedFolderSync::Cached(info),
            None => CachedFolderSync::NotCached,
        }
    }

    pub fn set_folder_sync(&self, path: &ResourcePath, info: Option<FolderSync>) {
        self.folders.lock().entry(path.clone()).or_default().folder_sync = Some(info);
    }

    pub fn dirty_indicator(&self, path: &ResourcePath) -> Option<DirtyIndicator> {
        self.resources.lock().get(path).and_then(|s| s.dirty)
    }

    pub fn set_dirty_indicator(&self, path: &ResourcePath, indicator: DirtyIndicator) {
        self.resources.lock().entry(path.clone()).or_default().dirty = Some(indicator);
    }

    pub fn flush_dirty(&self, path: &ResourcePath) {
        if let Some(state) = self.resources.lock().get_mut(path) {
            state.dirty = None;
        }
    }

    pub fn is_sync_loaded(&self, path: &ResourcePath) -> bool {
        self.folders
            .lock()
            .get(path)
            .map(|s| s.sync_loaded)
            .unwrap_or(false)
    }

    pub fn mark_sync_loaded(&self, path: &ResourcePath) {
        self.folders.lock().entry(path.clone()).or_default().sync_loaded = true;
    }

    pub fn purge(&self, path: &ResourcePath, deep: bool) {
        self.folders
            .lock()
            .retain(|key, _| !(key == path || (deep && key.starts_with(path))));
        self.resources.lock().retain(|key, _| {
            let is_child = key.parent().as_ref() == Some(path);
            let is_descendant = deep && key != path && key.starts_with(path);
            !(is_child || is_descendant)
        });
    }

    pub fn purge_resource_sync(&self, path: &ResourcePath) {
        self.resources.lock().remove(path);
    }
}
