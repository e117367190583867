//! The workspace synchronizer
//!
//! Thread-safe facade over the session and phantom caches, the on-disk
//! control store, the dirty propagator, and the change broadcaster. Only
//! one thread mutates the caches at a time; there is no per-resource
//! locking. Mutating operations follow one scaffold: open a batch scope
//! on the operation's rule, take the op lock, load the affected folder's
//! records on demand, mutate the caches, record the changed resources,
//! and let the outermost batch release write the accumulated deltas to
//! disk and broadcast them.
//!
//! Lock order is deterministic: a workspace scheduling rule is always
//! taken before the batch scope, and the batch scope before the op lock.
//! Linked folders get special treatment throughout so that their control
//! files are never read or written.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use cvsync_entries::{
    entry_line, BaserevInfo, FolderSync, NotifyInfo, ResourceSync, ADDED_REVISION,
};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, trace, warn};

use crate::batch::{BatchChanges, BatchLock};
use crate::broadcast::{ChangeBroadcaster, SyncChangeListener};
use crate::cache::{CachedFolderSync, SyncInfoCache};
use crate::control_store::{ControlStore, DiskStore};
use crate::dirty::{DirtyIndicator, ModificationState};
use crate::errors::{Result, SyncError};
use crate::ignore::IgnoreMatcher;
use crate::phantom_cache::PhantomCache;
use crate::progress::{NullProgress, ProgressMonitor};
use crate::resource::{Depth, Resource, ResourceKind};
use crate::session_cache::SessionCache;
use crate::workspace::Workspace;

pub struct Synchronizer {
    workspace: Arc<Workspace>,
    store: Arc<dyn ControlStore>,
    session: SessionCache,
    phantom: PhantomCache,
    batch: BatchLock,
    op_lock: ReentrantMutex<()>,
    broadcaster: ChangeBroadcaster,
}

impl Synchronizer {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self::with_store(workspace, Arc::new(DiskStore))
    }

    /// Build a synchronizer over a custom control store (used by tests
    /// to inject storage failures).
    pub fn with_store(workspace: Arc<Workspace>, store: Arc<dyn ControlStore>) -> Self {
        Synchronizer {
            workspace,
            store,
            session: SessionCache::new(),
            phantom: PhantomCache::new(),
            batch: BatchLock::new(),
            op_lock: ReentrantMutex::new(()),
            broadcaster: ChangeBroadcaster::new(),
        }
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn add_listener(&self, listener: Arc<dyn SyncChangeListener>) {
        self.broadcaster.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn SyncChangeListener>) {
        self.broadcaster.remove_listener(listener);
    }

    // ---- batching ----

    /// Open a batch scope covering `resource`. Pending changes are
    /// committed when calls to [`Synchronizer::end_batching`] balance
    /// the calls to this method.
    pub fn begin_batching(&self, resource: &Resource) -> Result<()> {
        self.batch.acquire(resource.path())
    }

    /// Close the current batch scope. The outermost call commits the
    /// accumulated changes to disk and broadcasts them; cancellation is
    /// ignored while the cache is written, to keep cache and disk
    /// coherent.
    pub fn end_batching(&self, monitor: &mut dyn ProgressMonitor) -> Result<()> {
        self.batch
            .release(|changes| self.commit_cache(changes, monitor))
    }

    /// Run `job` inside a batch scope on `root`, so that all of its
    /// mutations flush and broadcast once.
    pub fn run_batched<T>(
        &self,
        root: &Resource,
        monitor: &mut dyn ProgressMonitor,
        job: impl FnOnce(&Synchronizer) -> Result<T>,
    ) -> Result<T> {
        self.batch.acquire(root.path())?;
        let result = job(self);
        let ended = self
            .batch
            .release(|changes| self.commit_cache(changes, monitor));
        join_results(result, ended)
    }

    fn with_batch<T>(&self, rule: &Resource, job: impl FnOnce() -> Result<T>) -> Result<T> {
        self.batch.acquire(rule.path())?;
        let result = job();
        let ended = self
            .batch
            .release(|changes| self.commit_cache(changes, &mut NullProgress));
        join_results(result, ended)
    }

    fn begin_operation(&self) -> ReentrantMutexGuard<'_, ()> {
        self.op_lock.lock()
    }

    /// True if the resource is contained in the scheduling rule of the
    /// current thread's batch scope.
    pub fn is_within_operation_scope(&self, resource: &Resource) -> bool {
        self.batch.is_within_active_thread(resource)
    }

    // ---- folder sync ----

    /// Set the folder sync record. The folder must exist (or be a
    /// phantom) and must not be the workspace root.
    pub fn set_folder_sync(&self, folder: &Resource, info: FolderSync) -> Result<()> {
        if folder.kind() == ResourceKind::Root {
            // Folder sync on the root is silently ignored.
            return Ok(());
        }
        if !self.is_valid(folder) {
            return Err(SyncError::invalid_target(folder.path(), "set folder sync"));
        }
        self.with_batch(folder, || {
            let _op = self.begin_operation();
            let old = self.get_folder_sync(folder)?;
            self.cache_for(folder).set_folder_sync(folder, Some(info));
            // A folder becoming managed invalidates the ancestors'
            // cached dirty answers.
            if old.is_none() {
                self.adjust_dirty_state_recursively(folder, DirtyIndicator::Recompute);
            }
            self.batch.record_folder_changed(folder);
            Ok(())
        })
    }

    /// The folder sync record, or `None` for the root, an invalid folder
    /// or an unmanaged folder.
    pub fn get_folder_sync(&self, folder: &Resource) -> Result<Option<FolderSync>> {
        if folder.kind() == ResourceKind::Root || !self.is_valid(folder) {
            return Ok(None);
        }
        let _op = self.begin_operation();
        self.cache_folder_sync(folder)?;
        match self.cache_for(folder).folder_sync(folder) {
            CachedFolderSync::Cached(info) => Ok(info),
            CachedFolderSync::NotCached => Ok(None),
        }
    }

    /// Delete the folder sync record and the resource sync of every
    /// child. Does not recurse.
    pub fn delete_folder_sync(&self, folder: &Resource) -> Result<()> {
        if folder.kind() == ResourceKind::Root || !self.is_valid(folder) {
            return Ok(());
        }
        self.with_batch(folder, || {
            let _op = self.begin_operation();
            // Load first: deleting the folder sync may drop a phantom.
            self.cache_resource_sync_for_children(folder)?;
            for child in self.members(folder)? {
                self.batch.record_resource_changed(&child);
                self.cache_for(&child).set_sync_bytes(&child, None);
            }
            self.cache_for(folder).set_folder_sync(folder, None);
            self.batch.record_folder_changed(folder);
            Ok(())
        })
    }

    // ---- resource sync ----

    /// Set the resource sync record. The parent folder must exist (or be
    /// a phantom) and must not be the workspace root.
    pub fn set_resource_sync(&self, resource: &Resource, info: &ResourceSync) -> Result<()> {
        self.set_sync_bytes(resource, info.to_bytes())
    }

    /// Raw-bytes variant of [`Synchronizer::set_resource_sync`].
    pub fn set_sync_bytes(&self, resource: &Resource, bytes: Bytes) -> Result<()> {
        let Some(parent) = resource.parent() else {
            return Err(SyncError::invalid_target(resource.path(), "set resource sync"));
        };
        if parent.kind() == ResourceKind::Root || !self.is_valid(&parent) {
            return Err(SyncError::invalid_target(resource.path(), "set resource sync"));
        }
        self.with_batch(resource, || {
            let _op = self.begin_operation();
            self.cache_resource_sync_for_children(&parent)?;
            self.cache_for(resource).set_sync_bytes(resource, Some(bytes));
            self.batch.record_resource_changed(resource);
            Ok(())
        })
    }

    /// The decoded resource sync record, or `None` if the resource is
    /// unmanaged.
    pub fn get_resource_sync(&self, resource: &Resource) -> Result<Option<ResourceSync>> {
        match self.get_sync_bytes(resource)? {
            Some(bytes) => Ok(Some(ResourceSync::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The resource's raw sync bytes, or `None` if the resource is
    /// unmanaged. If the siblings cannot be cached because the workspace
    /// tree is locked (delta phase), falls back to a direct single-record
    /// disk read that bypasses the session cache.
    pub fn get_sync_bytes(&self, resource: &Resource) -> Result<Option<Bytes>> {
        let Some(parent) = resource.parent() else {
            return Ok(None);
        };
        if parent.kind() == ResourceKind::Root || !self.is_valid(&parent) {
            return Ok(None);
        }
        let _op = self.begin_operation();
        match self.cache_resource_sync_for_children(&parent) {
            Ok(()) => {}
            Err(SyncError::WorkspaceLocked) => {
                return self.sync_bytes_from_disk(resource, &parent);
            }
            Err(e) => return Err(e),
        }
        Ok(self.cache_for(resource).sync_bytes(resource))
    }

    /// Delete the resource sync record, if present.
    pub fn delete_resource_sync(&self, resource: &Resource) -> Result<()> {
        let Some(parent) = resource.parent() else {
            return Ok(());
        };
        if parent.kind() == ResourceKind::Root || !self.is_valid(&parent) {
            return Ok(());
        }
        self.with_batch(resource, || {
            let _op = self.begin_operation();
            self.cache_resource_sync_for_children(&parent)?;
            let cache = self.cache_for(resource);
            if cache.sync_bytes(resource).is_some() {
                cache.set_sync_bytes(resource, None);
                cache.flush_dirty(resource);
                self.adjust_dirty_state_recursively(&parent, DirtyIndicator::Recompute);
                self.batch.record_resource_changed(resource);
            }
            Ok(())
        })
    }

    /// A file created at the destination of a move carries no history:
    /// it must appear as unmanaged.
    pub fn created_by_move(&self, file: &Resource) -> Result<()> {
        self.delete_resource_sync(file)
    }

    // ---- ignores ----

    /// True if the resource's leaf name matches its parent folder's
    /// effective ignore list. The root, projects, and resources that do
    /// not exist are never ignored.
    pub fn is_ignored(&self, resource: &Resource) -> Result<bool> {
        if matches!(resource.kind(), ResourceKind::Root | ResourceKind::Project)
            || !self.workspace.exists(resource)
        {
            return Ok(false);
        }
        let Some(parent) = resource.parent() else {
            return Ok(false);
        };
        let _op = self.begin_operation();
        let matcher = self.cache_folder_ignores(&parent)?;
        Ok(matcher.matches(resource.name()))
    }

    /// Append a pattern to the folder's ignore list and rewrite the
    /// ignore file. The change is broadcast immediately for every
    /// currently unmanaged descendant, the only resources whose ignored
    /// status can have changed.
    pub fn add_ignored(&self, folder: &Resource, pattern: &str) -> Result<()> {
        if folder.kind() == ResourceKind::Root || !self.workspace.exists(folder) {
            return Err(SyncError::invalid_target(folder.path(), "set ignore pattern"));
        }
        self.with_batch(folder, || {
            let _op = self.begin_operation();
            let loc = self.workspace.folder_location(folder.path());
            let mut patterns = self.store.read_cvs_ignore(&loc)?.unwrap_or_default();
            if patterns.iter().any(|existing| existing == pattern) {
                return Ok(());
            }
            patterns.push(pattern.to_string());
            let matcher = Arc::new(IgnoreMatcher::compile(
                &self.workspace.options().default_ignores,
                &patterns,
                self.workspace.options().case_sensitive,
            )?);
            self.session.set_folder_ignores(folder, matcher);
            self.store.write_cvs_ignore(&loc, &patterns)?;

            let mut possible_ignores = Vec::new();
            self.accumulate_non_managed_children(folder, &mut possible_ignores)?;
            self.broadcaster.broadcast(&possible_ignores);
            Ok(())
        })
    }

    fn cache_folder_ignores(&self, folder: &Resource) -> Result<Arc<IgnoreMatcher>> {
        if let Some(matcher) = self.session.folder_ignores(folder) {
            return Ok(matcher);
        }
        let loc = self.workspace.folder_location(folder.path());
        let patterns = self.store.read_cvs_ignore(&loc)?.unwrap_or_default();
        let matcher = Arc::new(IgnoreMatcher::compile(
            &self.workspace.options().default_ignores,
            &patterns,
            self.workspace.options().case_sensitive,
        )?);
        self.session.set_folder_ignores(folder, matcher.clone());
        Ok(matcher)
    }

    fn accumulate_non_managed_children(
        &self,
        folder: &Resource,
        possible_ignores: &mut Vec<Resource>,
    ) -> Result<()> {
        self.cache_resource_sync_for_children(folder)?;
        let children = self.workspace.members_on_disk(folder)?;
        for child in &children {
            if self.cache_for(child).sync_bytes(child).is_none() {
                possible_ignores.push(child.clone());
            }
        }
        for child in children.into_iter().filter(Resource::is_container) {
            self.accumulate_non_managed_children(&child, possible_ignores)?;
        }
        Ok(())
    }

    /// An externally modified ignore file, recorded on the current
    /// thread's batch so its parent and siblings join the broadcast at
    /// flush time.
    pub fn handle_ignore_file_change(&self, file: &Resource) {
        debug_assert_eq!(file.kind(), ResourceKind::File);
        self.batch.record_ignore_file_changed(file);
    }

    // ---- members & loading ----

    /// The folder's children, including phantoms carrying sync records
    /// of deleted resources.
    pub fn members(&self, folder: &Resource) -> Result<Vec<Resource>> {
        if !self.is_valid(folder) {
            return Ok(Vec::new());
        }
        let _op = self.begin_operation();
        if folder.kind() != ResourceKind::Root {
            // Ensure the sync records are cached so phantoms materialise.
            self.cache_resource_sync_for_children(folder)?;
        }
        let mut members: BTreeMap<_, Resource> = BTreeMap::new();
        if self.workspace.exists(folder) {
            for member in self.workspace.members_on_disk(folder)? {
                members.insert(member.path().clone(), member);
            }
        }
        for member in self.phantom.members(folder) {
            members.entry(member.path().clone()).or_insert(member);
        }
        Ok(members.into_values().collect())
    }

    /// True if the sync information covering every given resource is
    /// already cached.
    pub fn is_sync_info_loaded(&self, resources: &[Resource], depth: Depth) -> Result<bool> {
        for folder in self.parent_folders(resources, depth)? {
            if !self.cache_for(&folder).is_sync_loaded(&folder) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Load resource sync, folder sync, and ignore patterns for every
    /// parent folder of the given resources, to the requested depth.
    pub fn ensure_sync_info_loaded(&self, resources: &[Resource], depth: Depth) -> Result<()> {
        for folder in self.parent_folders(resources, depth)? {
            let _op = self.begin_operation();
            self.cache_resource_sync_for_children(&folder)?;
            self.cache_folder_sync(&folder)?;
            if self.workspace.exists(&folder) {
                self.cache_folder_ignores(&folder)?;
            }
        }
        Ok(())
    }

    /// The projects and parent folders of the resources; that is where
    /// the sync information is kept.
    fn parent_folders(&self, resources: &[Resource], depth: Depth) -> Result<Vec<Resource>> {
        let mut folders = HashSet::new();
        for resource in resources {
            if let Some(project) = resource.project() {
                folders.insert(project);
            }
            if resource.kind() != ResourceKind::Project {
                if let Some(parent) = resource.parent() {
                    if parent.kind() != ResourceKind::Root {
                        folders.insert(parent);
                    }
                }
            }
            if depth != Depth::Zero && resource.is_container() {
                if resource.kind() == ResourceKind::Folder {
                    folders.insert(resource.clone());
                }
                self.collect_descendant_folders(resource, depth, &mut folders)?;
            }
        }
        Ok(folders.into_iter().collect())
    }

    fn collect_descendant_folders(
        &self,
        folder: &Resource,
        depth: Depth,
        out: &mut HashSet<Resource>,
    ) -> Result<()> {
        for child in self.workspace.members_on_disk(folder)? {
            if child.is_container() {
                if depth == Depth::Infinite {
                    self.collect_descendant_folders(&child, depth, out)?;
                }
                out.insert(child);
            }
        }
        Ok(())
    }

    // ---- deletion & moves ----

    /// The resource is about to be deleted (control directory included):
    /// preserve whatever sync information must survive.
    pub fn prepare_for_deletion(&self, resource: &Resource) -> Result<()> {
        if !self.workspace.exists(resource) {
            return Ok(());
        }
        self.with_batch(resource, || {
            let _op = self.begin_operation();
            // The deletion may yet fail, so ancestors only get a
            // recompute, not an eager answer.
            self.adjust_dirty_state_recursively(resource, DirtyIndicator::Recompute);
            match resource.kind() {
                ResourceKind::File => {
                    if let Some(bytes) = self.get_sync_bytes(resource)? {
                        if !entry_line::is_addition(&bytes)? {
                            let deletion = entry_line::convert_to_deletion(&bytes)?;
                            self.phantom.set_sync_bytes(resource, Some(deletion));
                        }
                        self.batch.record_resource_changed(resource);
                    }
                }
                ResourceKind::Project => {
                    self.phantom.purge(resource, true);
                }
                ResourceKind::Folder => {
                    let Some(info) = self.get_folder_sync(resource)? else {
                        return Ok(());
                    };
                    // Move the folder sync and the folder's own resource
                    // sync into phantom space.
                    self.phantom.set_folder_sync(resource, Some(info));
                    self.batch.record_folder_changed(resource);
                    let bytes = self.get_sync_bytes(resource)?;
                    self.phantom.set_sync_bytes(resource, bytes);
                }
                ResourceKind::Root => {}
            }
            Ok(())
        })
    }

    /// The resource was deleted behind our back (no move/delete hook):
    /// clear any cached dirty answer.
    pub fn handle_deleted(&self, resource: &Resource) -> Result<()> {
        if self.workspace.exists(resource) {
            return Ok(());
        }
        self.with_batch(resource, || {
            let _op = self.begin_operation();
            self.adjust_dirty_state_recursively(resource, DirtyIndicator::Recompute);
            Ok(())
        })
    }

    /// Prepare a move or delete: move the sync information of the whole
    /// subtree into phantom space, then drop the session cache for it.
    /// Sync for deletions survives at the source, and sync at the
    /// destination is preserved.
    pub fn prepare_for_move_delete(
        &self,
        resource: &Resource,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<()> {
        self.visit_subtree(resource, &mut |visited| {
            self.prepare_for_deletion(visited)?;
            monitor.worked(1);
            Ok(())
        })?;
        self.session.purge_resource_sync(resource);
        if resource.is_container() {
            self.session.purge(resource, true);
        }
        monitor.done();
        Ok(())
    }

    fn visit_subtree(
        &self,
        resource: &Resource,
        visit: &mut dyn FnMut(&Resource) -> Result<()>,
    ) -> Result<()> {
        visit(resource)?;
        if resource.is_container() {
            for child in self.workspace.members_on_disk(resource)? {
                self.visit_subtree(&child, visit)?;
            }
        }
        Ok(())
    }

    // ---- flushing & cache lifecycle ----

    /// Flush the current thread's pending changes to disk, then purge the
    /// session cache below `folder` so the next access re-reads disk.
    /// May flush more than strictly needed, never less. Cancellation is
    /// honored before the flush starts and ignored afterwards.
    pub fn flush(
        &self,
        folder: &Resource,
        deep: bool,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<()> {
        // Cancellation is respected here, before any flushing starts;
        // once the commit begins it is ignored.
        if monitor.is_canceled() {
            return Err(SyncError::Cancelled);
        }
        self.batch.acquire(folder.path())?;
        let result = (|| {
            // The op lock is not held across the commit's disk writes;
            // the commit takes it around each folder's write.
            let flushed = self
                .batch
                .flush_current(|changes| self.commit_cache(changes, &mut *monitor));
            // Purge even when the flush failed; stale state must not
            // outlive a failed write.
            let _op = self.begin_operation();
            self.session.purge(folder, deep);
            flushed
        })();
        let ended = self
            .batch
            .release(|changes| self.commit_cache(changes, &mut *monitor));
        monitor.done();
        join_results(result, ended)
    }

    /// Project is being deconfigured: flush everything, then forget the
    /// phantom state kept for pruned folders.
    pub fn deconfigure(
        &self,
        project: &Resource,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<()> {
        self.batch.acquire(project.path())?;
        let flushed = self.flush(project, true, monitor);
        // The top level pruned folder keeps an entry in its parent, so
        // the project stays managed without being a managed folder;
        // everything below is forgotten.
        self.phantom.purge(project, true);
        let ended = self
            .batch
            .release(|changes| self.commit_cache(changes, &mut *monitor));
        join_results(flushed, ended)
    }

    /// Control files changed on disk outside the workbench: drop the
    /// affected session cache regions and broadcast the folder and its
    /// immediate children.
    pub fn sync_files_changed(&self, roots: &[Resource]) -> Result<()> {
        for root in roots {
            self.session.purge(root, false);
            let mut changed = vec![root.clone()];
            changed.extend(self.workspace.members_on_disk(root)?);
            self.broadcaster.broadcast(&changed);
        }
        Ok(())
    }

    // ---- dirty state ----

    /// Mark the resource dirty or clean and adjust its ancestors.
    pub fn set_dirty_indicator(&self, resource: &Resource, modified: bool) {
        let indicator = if modified {
            DirtyIndicator::IsDirty
        } else {
            DirtyIndicator::NotDirty
        };
        self.adjust_dirty_state_recursively(resource, indicator);
    }

    pub fn get_dirty_indicator(&self, resource: &Resource) -> Option<DirtyIndicator> {
        let _op = self.begin_operation();
        self.cache_for(resource).dirty_indicator(resource)
    }

    /// The modification state derived from the cached dirty indicator.
    /// `Unknown` means the caller must recompute by inspecting children.
    pub fn get_modification_state(&self, resource: &Resource) -> ModificationState {
        ModificationState::from_indicator(self.get_dirty_indicator(resource))
    }

    fn adjust_dirty_state_recursively(&self, resource: &Resource, indicator: DirtyIndicator) {
        let mut current = resource.clone();
        let mut indicator = indicator;
        loop {
            if current.kind() == ResourceKind::Root {
                return;
            }
            let _op = self.begin_operation();
            let cache = self.cache_for(&current);
            if cache.dirty_indicator(&current) == Some(indicator) {
                // Nothing to change here, so nothing above can change
                // either: the ascent terminates.
                return;
            }
            trace!(resource = %current, ?indicator, "adjusting dirty state");
            cache.set_dirty_indicator(&current, indicator);
            let Some(parent) = current.parent() else {
                return;
            };
            indicator = indicator.ancestor_indicator();
            current = parent;
        }
    }

    // ---- notify & baserev ----

    /// Upsert (or, with `None`, remove) the file's notify record. An
    /// existing record for the same name is replaced silently.
    pub fn set_notify_info(&self, resource: &Resource, info: Option<NotifyInfo>) -> Result<()> {
        let Some(parent) = resource.parent() else {
            return Err(SyncError::invalid_target(resource.path(), "set notify info"));
        };
        let _op = self.begin_operation();
        let loc = self.workspace.folder_location(parent.path());
        let existing = self.store.read_all_notify(&loc)?;
        let infos = match (existing, info) {
            (None, None) => return Ok(()),
            (None, Some(info)) => vec![info],
            (Some(existing), info) => {
                upsert_by_name(existing, resource.name(), info, |entry| entry.name())
            }
        };
        self.store.write_all_notify(&loc, &infos)?;
        Ok(())
    }

    pub fn get_notify_info(&self, resource: &Resource) -> Result<Option<NotifyInfo>> {
        let Some(parent) = resource.parent() else {
            return Ok(None);
        };
        let _op = self.begin_operation();
        let loc = self.workspace.folder_location(parent.path());
        Ok(self
            .store
            .read_all_notify(&loc)?
            .and_then(|infos| infos.into_iter().find(|i| i.name() == resource.name())))
    }

    pub fn delete_notify_info(&self, resource: &Resource) -> Result<()> {
        self.set_notify_info(resource, None)
    }

    /// Upsert the file's baserev record; an existing record for the same
    /// name is replaced silently.
    pub fn set_baserev_info(&self, resource: &Resource, info: BaserevInfo) -> Result<()> {
        let Some(parent) = resource.parent() else {
            return Err(SyncError::invalid_target(resource.path(), "set baserev info"));
        };
        let _op = self.begin_operation();
        let loc = self.workspace.folder_location(parent.path());
        let name = info.name().to_string();
        let infos = match self.store.read_all_baserev(&loc)? {
            None => vec![info],
            Some(existing) => upsert_by_name(existing, &name, Some(info), |entry| entry.name()),
        };
        self.store.write_all_baserev(&loc, &infos)?;
        Ok(())
    }

    pub fn get_baserev_info(&self, resource: &Resource) -> Result<Option<BaserevInfo>> {
        let Some(parent) = resource.parent() else {
            return Ok(None);
        };
        let _op = self.begin_operation();
        let loc = self.workspace.folder_location(parent.path());
        Ok(self
            .store
            .read_all_baserev(&loc)?
            .and_then(|infos| infos.into_iter().find(|i| i.name() == resource.name())))
    }

    pub fn delete_baserev_info(&self, resource: &Resource) -> Result<()> {
        let Some(parent) = resource.parent() else {
            return Ok(());
        };
        let _op = self.begin_operation();
        let loc = self.workspace.folder_location(parent.path());
        let Some(existing) = self.store.read_all_baserev(&loc)? else {
            return Ok(());
        };
        let infos = upsert_by_name(existing, resource.name(), None, |entry| entry.name());
        self.store.write_all_baserev(&loc, &infos)?;
        Ok(())
    }

    // ---- base directory (offline edit) ----

    /// Copy the working file into the base directory. The file must be
    /// managed and exist remotely, so additions and deletions are
    /// skipped.
    pub fn copy_file_to_base(
        &self,
        file: &Resource,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<()> {
        let result = self.with_batch(file, || {
            let Some(info) = self.get_resource_sync(file)? else {
                return Ok(());
            };
            if info.is_addition() || info.is_deletion() {
                return Ok(());
            }
            let Some(parent) = file.parent() else {
                return Ok(());
            };
            let loc = self.workspace.folder_location(parent.path());
            self.store.copy_to_base(&loc, file.name())?;
            self.batch.record_resource_changed(file);
            Ok(())
        });
        monitor.done();
        result
    }

    /// Restore the working file from its base copy.
    pub fn restore_file_from_base(
        &self,
        file: &Resource,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<()> {
        let result = self.with_batch(file, || {
            let Some(info) = self.get_resource_sync(file)? else {
                return Ok(());
            };
            if info.is_addition() {
                return Ok(());
            }
            let Some(parent) = file.parent() else {
                return Ok(());
            };
            let loc = self.workspace.folder_location(parent.path());
            self.store.restore_from_base(&loc, file.name())?;
            self.batch.record_resource_changed(file);
            Ok(())
        });
        monitor.done();
        result
    }

    /// Remove the file's base copy.
    pub fn delete_file_from_base(&self, file: &Resource) -> Result<()> {
        let Some(info) = self.get_resource_sync(file)? else {
            return Ok(());
        };
        if info.is_addition() {
            return Ok(());
        }
        let Some(parent) = file.parent() else {
            return Ok(());
        };
        let loc = self.workspace.folder_location(parent.path());
        self.store.delete_base(&loc, file.name())?;
        Ok(())
    }

    /// True if the file was put under edit and not yet committed or
    /// unedited.
    pub fn is_edited(&self, file: &Resource) -> Result<bool> {
        let Some(parent) = file.parent() else {
            return Ok(false);
        };
        let loc = self.workspace.folder_location(parent.path());
        Ok(self.store.is_edited(&loc, file.name())?)
    }

    // ---- cache routing & loading ----

    fn cache_for(&self, resource: &Resource) -> &dyn SyncInfoCache {
        if self.workspace.exists(resource) {
            &self.session
        } else {
            &self.phantom
        }
    }

    fn is_valid(&self, resource: &Resource) -> bool {
        self.workspace.exists(resource) || self.phantom.is_phantom(resource)
    }

    /// Load and cache the sync records of the folder's children, once
    /// per session. Phantom children materialise here: deletion-form
    /// records for resources missing on disk land in the phantom cache.
    fn cache_resource_sync_for_children(&self, folder: &Resource) -> Result<()> {
        let cache = self.cache_for(folder);
        if cache.is_sync_loaded(folder) {
            return Ok(());
        }
        if self.workspace.is_tree_locked() {
            // Loading would create phantoms during a delta phase.
            return Err(SyncError::WorkspaceLocked);
        }
        let loc = self.workspace.folder_location(folder.path());
        let infos = if loc.is_linked() {
            None
        } else {
            self.store.read_all_resource_sync(&loc)?
        };
        if let Some(infos) = infos {
            trace!(folder = %folder, records = infos.len(), "caching sync records");
            for bytes in infos {
                let name = match entry_line::name_of(&bytes) {
                    Ok(name) => name.to_string(),
                    Err(e) => {
                        warn!(folder = %folder, error = %e, "skipping unreadable sync record");
                        continue;
                    }
                };
                let child_path = folder.path().join(&name);
                let child = if entry_line::is_folder(&bytes) {
                    Resource::folder(child_path)
                } else {
                    Resource::file(child_path)
                };
                let bytes = match ResourceSync::from_bytes(&bytes) {
                    Ok(_) => bytes,
                    Err(e) => {
                        warn!(resource = %child, error = %e, "malformed sync record; substituting added entry");
                        Bytes::from(format!("/{name}/{ADDED_REVISION}///"))
                    }
                };
                self.cache_for(&child).set_sync_bytes(&child, Some(bytes));
            }
        }
        cache.mark_sync_loaded(folder);
        Ok(())
    }

    /// Load and cache the folder's sync record, once per session.
    fn cache_folder_sync(&self, folder: &Resource) -> Result<()> {
        let cache = self.cache_for(folder);
        if let CachedFolderSync::Cached(_) = cache.folder_sync(folder) {
            return Ok(());
        }
        let loc = self.workspace.folder_location(folder.path());
        let info = if loc.is_linked() {
            None
        } else {
            self.store.read_folder_sync(&loc)?
        };
        cache.set_folder_sync(folder, info);
        Ok(())
    }

    /// Direct single-record read used when the session cache cannot be
    /// populated.
    fn sync_bytes_from_disk(&self, resource: &Resource, parent: &Resource) -> Result<Option<Bytes>> {
        let loc = self.workspace.folder_location(parent.path());
        let Some(infos) = self.store.read_all_resource_sync(&loc)? else {
            return Ok(None);
        };
        for bytes in infos {
            if entry_line::name_of(&bytes).map(|n| n == resource.name()).unwrap_or(false) {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    // ---- commit ----

    /// Write the batch's accumulated deltas to disk and broadcast them.
    ///
    /// Failures are captured per folder: the folder's session cache is
    /// purged so subsequent reads re-consult disk, and the commit
    /// continues with the remaining folders. All captured errors are
    /// merged into one `CommittingSyncInfoFailed`.
    fn commit_cache(&self, changes: BatchChanges, monitor: &mut dyn ProgressMonitor) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut errors: Vec<SyncError> = Vec::new();
        let mut dirty_parents: HashSet<Resource> = changes
            .changed_resources
            .iter()
            .filter_map(Resource::parent)
            .collect();

        monitor.begin_task(changes.changed_folders.len() + dirty_parents.len());
        let deferred_cancel = monitor.is_canceled();
        monitor.subtask(if deferred_cancel {
            "updating sync information (cancellation deferred)"
        } else {
            "updating sync information"
        });

        // Folder sync deltas.
        for folder in &changes.changed_folders {
            if self.workspace.exists(folder) && folder.kind() != ResourceKind::Root {
                let _op = self.begin_operation();
                let loc = self.workspace.folder_location(folder.path());
                let result = match self.session.folder_sync(folder) {
                    CachedFolderSync::Cached(Some(info)) => self
                        .store
                        .write_folder_sync(&loc, &info)
                        .map_err(SyncError::from),
                    // Deleted since it was loaded. Linked folder sync is
                    // never written, so there is nothing to delete
                    // either.
                    _ => {
                        dirty_parents.remove(folder);
                        if loc.is_linked() {
                            Ok(())
                        } else {
                            self.store.delete_folder_sync(&loc).map_err(SyncError::from)
                        }
                    }
                };
                if let Err(e) = result {
                    self.session.purge(folder, true);
                    errors.push(e);
                }
            }
            monitor.worked(1);
        }

        // Resource sync deltas, one write per parent folder.
        for folder in &dirty_parents {
            if self.workspace.exists(folder) && folder.kind() != ResourceKind::Root {
                let result = (|| -> Result<()> {
                    let _op = self.begin_operation();
                    let mut infos = Vec::new();
                    for child in self.members(folder)? {
                        if let Some(bytes) = self.get_sync_bytes(&child)? {
                            infos.push(bytes);
                        }
                    }
                    let loc = self.workspace.folder_location(folder.path());
                    if !infos.is_empty() || !loc.is_linked() {
                        self.store.write_all_resource_sync(&loc, &infos)?;
                    }
                    Ok(())
                })();
                if let Err(e) = result {
                    self.session.purge(folder, false);
                    errors.push(e);
                }
            }
            monitor.worked(1);
        }

        // Broadcast the union of everything affected.
        monitor.subtask("notifying listeners");
        let mut all: HashSet<Resource> = HashSet::new();
        all.extend(changes.changed_resources.iter().cloned());
        all.extend(changes.changed_folders.iter().cloned());
        all.extend(dirty_parents);
        for file in &changes.changed_ignore_files {
            if let Some(parent) = file.parent() {
                if self.workspace.exists(&parent) {
                    match self.workspace.members_on_disk(&parent) {
                        Ok(members) => {
                            all.insert(parent);
                            all.extend(members);
                        }
                        Err(e) => errors.push(e),
                    }
                }
            }
        }
        let resources: Vec<Resource> = all.into_iter().collect();
        self.broadcaster.broadcast(&resources);
        debug!(resources = resources.len(), errors = errors.len(), "committed sync cache");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SyncError::CommittingSyncInfoFailed { errors })
        }
    }
}

fn join_results<T>(result: Result<T>, ended: Result<()>) -> Result<T> {
    match (result, ended) {
        (Err(e), _) => Err(e),
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
    }
}

/// Replace-or-insert an entry keyed by file name; `None` removes it.
fn upsert_by_name<T>(
    existing: Vec<T>,
    name: &str,
    replacement: Option<T>,
    name_of: impl Fn(&T) -> &str,
) -> Vec<T> {
    let mut out: Vec<T> = existing
        .into_iter()
        .filter(|entry| name_of(entry) != name)
        .collect();
    if let Some(replacement) = replacement {
        out.push(replacement);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourcePath;
    use cvsync_entries::NotifyKind;
    use std::fs;
    use tempfile::TempDir;

    fn harness() -> (TempDir, Synchronizer) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("proj").join("src")).unwrap();
        fs::write(dir.path().join("proj").join("src").join("a.txt"), b"x").unwrap();
        let workspace = Arc::new(Workspace::new(dir.path()).unwrap());
        let sync = Synchronizer::new(workspace);
        (dir, sync)
    }

    fn folder(path: &str) -> Resource {
        Resource::folder(ResourcePath::parse(path))
    }

    fn file(path: &str) -> Resource {
        Resource::file(ResourcePath::parse(path))
    }

    #[test]
    fn folder_sync_round_trips_through_cache() {
        let (_dir, sync) = harness();
        let src = folder("/proj/src");
        let info = FolderSync::new(":local:/cvsroot", "proj/src", None, false);
        sync.set_folder_sync(&src, info.clone()).unwrap();
        assert_eq!(sync.get_folder_sync(&src).unwrap(), Some(info));
        assert_eq!(sync.get_folder_sync(&Resource::root()).unwrap(), None);
    }

    #[test]
    fn setting_sync_for_orphans_is_rejected() {
        let (_dir, sync) = harness();
        let orphan = file("/proj/missing-dir/a.txt");
        let err = sync
            .set_resource_sync(&orphan, &ResourceSync::file("a.txt", "1.1"))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidTarget { .. }));
        // Reads are silent for invalid parents.
        assert!(sync.get_sync_bytes(&orphan).unwrap().is_none());
    }

    #[test]
    fn dirty_state_propagates_to_ancestors() {
        let (_dir, sync) = harness();
        let a = file("/proj/src/a.txt");

        sync.set_dirty_indicator(&a, true);
        assert_eq!(sync.get_modification_state(&a), ModificationState::Dirty);
        assert_eq!(
            sync.get_modification_state(&folder("/proj/src")),
            ModificationState::Dirty
        );
        assert_eq!(
            sync.get_modification_state(&folder("/proj")),
            ModificationState::Dirty
        );

        // Cleaning the file only invalidates the ancestors' answers.
        sync.set_dirty_indicator(&a, false);
        assert_eq!(sync.get_modification_state(&a), ModificationState::Clean);
        assert_eq!(
            sync.get_modification_state(&folder("/proj/src")),
            ModificationState::Unknown
        );
        assert_eq!(
            sync.get_modification_state(&folder("/proj")),
            ModificationState::Unknown
        );
    }

    #[test]
    fn notify_upsert_replaces_silently() {
        // Pins the historical upsert behavior: a second record for the
        // same name replaces the first without complaint.
        let (_dir, sync) = harness();
        let a = file("/proj/src/a.txt");
        let first = NotifyInfo::new("a.txt", NotifyKind::Edit, "ts1", "E").unwrap();
        let second = NotifyInfo::new("a.txt", NotifyKind::Unedit, "ts2", "EU").unwrap();

        sync.set_notify_info(&a, Some(first)).unwrap();
        sync.set_notify_info(&a, Some(second.clone())).unwrap();
        assert_eq!(sync.get_notify_info(&a).unwrap(), Some(second));

        sync.delete_notify_info(&a).unwrap();
        assert_eq!(sync.get_notify_info(&a).unwrap(), None);
    }

    #[test]
    fn baserev_upsert_and_delete() {
        let (_dir, sync) = harness();
        let a = file("/proj/src/a.txt");
        sync.set_baserev_info(&a, BaserevInfo::new("a.txt", "1.1")).unwrap();
        sync.set_baserev_info(&a, BaserevInfo::new("a.txt", "1.2")).unwrap();
        assert_eq!(
            sync.get_baserev_info(&a).unwrap().unwrap().revision(),
            "1.2"
        );
        sync.delete_baserev_info(&a).unwrap();
        assert_eq!(sync.get_baserev_info(&a).unwrap(), None);
    }

    #[test]
    fn ignored_names_follow_parent_patterns() {
        let (dir, sync) = harness();
        fs::write(dir.path().join("proj").join("src").join("build.log"), b"").unwrap();
        let log = file("/proj/src/build.log");
        assert!(!sync.is_ignored(&log).unwrap());

        sync.add_ignored(&folder("/proj/src"), "*.log").unwrap();
        assert!(sync.is_ignored(&log).unwrap());
        // Projects and absent resources are never ignored.
        assert!(!sync.is_ignored(&folder("/proj")).unwrap());
        assert!(!sync.is_ignored(&file("/proj/src/absent.log")).unwrap());
    }

    #[test]
    fn tree_locked_reads_fall_back_to_disk() {
        let (_dir, sync) = harness();
        let src = folder("/proj/src");
        let a = file("/proj/src/a.txt");
        sync.set_folder_sync(&src, FolderSync::new(":local:/r", "proj/src", None, false))
            .unwrap();
        sync.set_resource_sync(&a, &ResourceSync::file("a.txt", "1.5")).unwrap();

        // Drop the cache so the next read must go to disk.
        sync.flush(&src, true, &mut NullProgress).unwrap();
        sync.workspace().set_tree_locked(true);
        let bytes = sync.get_sync_bytes(&a).unwrap().expect("disk fallback");
        assert_eq!(entry_line::revision_of(&bytes).unwrap(), "1.5");
        // The fallback must not have populated the session cache.
        assert!(!sync.is_sync_info_loaded(&[a], Depth::Zero).unwrap());
        sync.workspace().set_tree_locked(false);
    }
}
