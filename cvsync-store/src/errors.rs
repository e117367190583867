//! Error types for control file storage

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("control files of linked folder {path} are not writable")]
    LinkedFolderNotWritable { path: PathBuf },

    #[error("sync record error: {0}")]
    Records(#[from] cvsync_entries::EntriesError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// The folder or file the error is anchored to, when it carries one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            StoreError::Io { path, .. } | StoreError::LinkedFolderNotWritable { path } => {
                Some(path)
            }
            StoreError::Records(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
