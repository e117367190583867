//! Control store seam
//!
//! The synchronizer talks to the disk layer through this trait so that
//! tests can inject failures and embedders can interpose their own
//! storage. `DiskStore` is the production implementation, delegating to
//! the control-file store.

use bytes::Bytes;
use cvsync_entries::{BaserevInfo, FolderSync, NotifyInfo};
use cvsync_store::{base, files, FolderLocation};

pub type StoreResult<T> = cvsync_store::Result<T>;

pub trait ControlStore: Send + Sync {
    fn read_all_resource_sync(&self, loc: &FolderLocation) -> StoreResult<Option<Vec<Bytes>>>;
    fn write_all_resource_sync(&self, loc: &FolderLocation, infos: &[Bytes]) -> StoreResult<()>;
    fn read_folder_sync(&self, loc: &FolderLocation) -> StoreResult<Option<FolderSync>>;
    fn write_folder_sync(&self, loc: &FolderLocation, info: &FolderSync) -> StoreResult<()>;
    fn delete_folder_sync(&self, loc: &FolderLocation) -> StoreResult<()>;
    fn read_cvs_ignore(&self, loc: &FolderLocation) -> StoreResult<Option<Vec<String>>>;
    fn write_cvs_ignore(&self, loc: &FolderLocation, patterns: &[String]) -> StoreResult<()>;
    fn read_all_notify(&self, loc: &FolderLocation) -> StoreResult<Option<Vec<NotifyInfo>>>;
    fn write_all_notify(&self, loc: &FolderLocation, infos: &[NotifyInfo]) -> StoreResult<()>;
    fn read_all_baserev(&self, loc: &FolderLocation) -> StoreResult<Option<Vec<BaserevInfo>>>;
    fn write_all_baserev(&self, loc: &FolderLocation, infos: &[BaserevInfo]) -> StoreResult<()>;
    fn is_edited(&self, loc: &FolderLocation, name: &str) -> StoreResult<bool>;
    fn copy_to_base(&self, loc: &FolderLocation, name: &str) -> StoreResult<()>;
    fn restore_from_base(&self, loc: &FolderLocation, name: &str) -> StoreResult<()>;
    fn delete_base(&self, loc: &FolderLocation, name: &str) -> StoreResult<()>;
}

/// The on-disk control directory store.
#[derive(Debug, Default)]
pub struct DiskStore;

impl ControlStore for DiskStore {
    fn read_all_resource_sync(&self, loc: &FolderLocation) -> StoreResult<Option<Vec<Bytes>>> {
        files::read_all_resource_sync(loc)
    }

    fn write_all_resource_sync(&self, loc: &FolderLocation, infos: &[Bytes]) -> StoreResult<()> {
        files::write_all_resource_sync(loc, infos)
    }

    fn read_folder_sync(&self, loc: &FolderLocation) -> StoreResult<Option<FolderSync>> {
        files::read_folder_sync(loc)
    }

    fn write_folder_sync(&self, loc: &FolderLocation, info: &FolderSync) -> StoreResult<()> {
        files::write_folder_sync(loc, info)
    }

    fn delete_folder_sync(&self, loc: &FolderLocation) -> StoreResult<()> {
        files::delete_folder_sync(loc)
    }

    fn read_cvs_ignore(&self, loc: &FolderLocation) -> StoreResult<Option<Vec<String>>> {
        files::read_cvs_ignore(loc)
    }

    fn write_cvs_ignore(&self, loc: &FolderLocation, patterns: &[String]) -> StoreResult<()> {
        files::write_cvs_ignore(loc, patterns)
    }

    fn read_all_notify(&self, loc: &FolderLocation) -> StoreResult<Option<Vec<NotifyInfo>>> {
        files::read_all_notify(loc)
    }

    fn write_all_notify(&self, loc: &FolderLocation, infos: &[NotifyInfo]) -> StoreResult<()> {
        files::write_all_notify(loc, infos)
    }

    fn read_all_baserev(&self, loc: &FolderLocation) -> StoreResult<Option<Vec<BaserevInfo>>> {
        files::read_all_baserev(loc)
    }

    fn write_all_baserev(&self, loc: &FolderLocation, infos: &[BaserevInfo]) -> StoreResult<()> {
        files::write_all_baserev(loc, infos)
    }

    fn is_edited(&self, loc: &FolderLocation, name: &str) -> StoreResult<bool> {
        base::is_edited(loc, name)
    }

    fn copy_to_base(&self, loc: &FolderLocation, name: &str) -> StoreResult<()> {
        base::copy_to_base(loc, name)
    }

    fn restore_from_base(&self, loc: &FolderLocation, name: &str) -> StoreResult<()> {
        base::restore_from_base(loc, name)
    }

    fn delete_base(&self, loc: &FolderLocation, name: &str) -> StoreResult<()> {
        base::delete_base(loc, name)
    }
}
