//! Workspace synchronizer for CVS-family sync metadata
//!
//! This crate maintains the synchronization metadata of a workspace tree
//! that mirrors a remote CVS-family repository: per-resource sync records,
//! per-folder sync records, ignore patterns, edit/notify and base-revision
//! side records, and a tri-state dirty indicator propagated up the tree.
//!
//! The centre of the crate is [`Synchronizer`], a thread-safe in-memory
//! cache layered over the on-disk control directories, coordinated by a
//! per-thread reentrant batching lock that defers disk writes and change
//! broadcasts until the outermost batch completes.
//!
//! Lock order is strict and must be respected by embedders:
//! workspace scheduling rule, then batch scope, then op lock. A thread
//! must never take a workspace rule while holding the op lock.

pub mod batch;
pub mod broadcast;
pub mod cache;
pub mod control_store;
pub mod dirty;
pub mod errors;
pub mod ignore;
pub mod phantom_cache;
pub mod progress;
pub mod resource;
pub mod session_cache;
pub mod synchronizer;
pub mod workspace;

pub use batch::{BatchChanges, BatchLock};
pub use broadcast::{ChangeBroadcaster, SyncChangeListener};
pub use cache::{CachedFolderSync, SyncInfoCache};
pub use control_store::{ControlStore, DiskStore};
pub use dirty::{DirtyIndicator, ModificationState};
pub use errors::{Result, SyncError};
pub use ignore::{IgnoreMatcher, DEFAULT_IGNORE_PATTERNS};
pub use progress::{NullProgress, ProgressMonitor};
pub use resource::{Depth, Resource, ResourceKind, ResourcePath};
pub use synchronizer::Synchronizer;
pub use workspace::{SyncOptions, Workspace};
