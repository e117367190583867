//! The workspace tree
//!
//! A `Workspace` maps logical resource paths onto a filesystem root.
//! Top-level directories are projects. Folders may be mounted from a
//! location outside their project (link mounts); their control data is
//! never touched. The tree-locked flag models the host's resource-delta
//! phase, during which the session cache must not be populated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use cvsync_store::FolderLocation;

use crate::errors::{Result, SyncError};
use crate::ignore::DEFAULT_IGNORE_PATTERNS;
use crate::resource::{Resource, ResourceKind, ResourcePath};

/// Workspace-wide synchronization options.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Patterns every folder ignores, before its own ignore file applies.
    pub default_ignores: Vec<String>,
    /// Whether leaf names match case-sensitively.
    pub case_sensitive: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            default_ignores: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            case_sensitive: true,
        }
    }
}

/// The workspace tree, keyed by logical path.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    links: HashMap<ResourcePath, PathBuf>,
    options: SyncOptions,
    tree_locked: AtomicBool,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(root, SyncOptions::default())
    }

    pub fn with_options(root: impl Into<PathBuf>, options: SyncOptions) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| SyncError::io(&root, e))?;
        Ok(Workspace {
            root,
            links: HashMap::new(),
            options,
            tree_locked: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// Mount a folder from a location outside the workspace.
    pub fn add_link_mount(&mut self, path: ResourcePath, target: impl Into<PathBuf>) {
        self.links.insert(path, target.into());
    }

    /// True if the path, or an ancestor, is an explicit link mount.
    pub fn is_link_mounted(&self, path: &ResourcePath) -> bool {
        self.links.keys().any(|mount| path.starts_with(mount))
    }

    /// The filesystem location of a logical path, following the deepest
    /// applicable link mount.
    pub fn fs_location(&self, path: &ResourcePath) -> PathBuf {
        let mount = self
            .links
            .iter()
            .filter(|(mount, _)| path.starts_with(mount))
            .max_by_key(|(mount, _)| mount.depth());
        let (base, skip) = match mount {
            Some((mount, target)) => (target.clone(), mount.depth()),
            None => (self.root.clone(), 0),
        };
        path.segments()[skip..]
            .iter()
            .fold(base, |acc, segment| acc.join(segment))
    }

    /// The store-level location of a folder, carrying its project root
    /// and link-mount status.
    pub fn folder_location(&self, path: &ResourcePath) -> FolderLocation {
        let project_root = match path.project() {
            Some(project) => self.root.join(&project.segments()[0]),
            None => self.root.clone(),
        };
        let location = FolderLocation::new(self.fs_location(path), project_root);
        if self.is_link_mounted(path) {
            location.link_mounted()
        } else {
            location
        }
    }

    /// True if the resource is present on disk with the expected kind.
    /// The root always exists.
    pub fn exists(&self, resource: &Resource) -> bool {
        if resource.kind() == ResourceKind::Root {
            return true;
        }
        match fs::metadata(self.fs_location(resource.path())) {
            Ok(meta) => {
                if resource.is_container() {
                    meta.is_dir()
                } else {
                    meta.is_file()
                }
            }
            Err(_) => false,
        }
    }

    /// The resource's extant children, sorted by name. Control
    /// directories are not resources and are skipped.
    pub fn members_on_disk(&self, folder: &Resource) -> Result<Vec<Resource>> {
        let dir = self.fs_location(folder.path());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::io(dir, e)),
        };
        let mut members = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SyncError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == cvsync_store::files::CONTROL_DIR {
                continue;
            }
            let child = folder.path().join(name);
            let file_type = entry.file_type().map_err(|e| SyncError::io(&dir, e))?;
            members.push(if file_type.is_dir() {
                Resource::folder(child)
            } else {
                Resource::file(child)
            });
        }
        members.sort();
        Ok(members)
    }

    /// Mark the start or end of a host delta phase; while locked, the
    /// session cache must not be populated from disk.
    pub fn set_tree_locked(&self, locked: bool) {
        self.tree_locked.store(locked, Ordering::SeqCst);
    }

    pub fn is_tree_locked(&self) -> bool {
        self.tree_locked.load(Ordering::SeqCst)
    }
}
