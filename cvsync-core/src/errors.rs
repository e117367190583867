//! Error types for synchronizer operations

use std::path::PathBuf;

use thiserror::Error;

use crate::resource::ResourcePath;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("sync record error: {0}")]
    Records(#[from] cvsync_entries::EntriesError),

    #[error("control file error: {0}")]
    Store(#[from] cvsync_store::StoreError),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace tree is locked")]
    WorkspaceLocked,

    #[error("invalid batch scope: {0}")]
    InvalidScope(String),

    #[error("cannot {action} for {path}")]
    InvalidTarget {
        path: ResourcePath,
        action: &'static str,
    },

    #[error("ignore pattern error: {0}")]
    Pattern(#[from] globset::Error),

    #[error("committing sync info failed ({} folders)", .errors.len())]
    CommittingSyncInfoFailed { errors: Vec<SyncError> },

    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_target(path: &ResourcePath, action: &'static str) -> Self {
        SyncError::InvalidTarget {
            path: path.clone(),
            action,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
