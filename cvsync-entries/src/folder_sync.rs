//! Per-folder sync records

use serde::{Deserialize, Serialize};

use crate::tag::CvsTag;

/// Sync record for a managed folder.
///
/// Absence of a `FolderSync` means the folder is not managed at all. The
/// record names the remote repository, the folder's path relative to that
/// repository, the sticky tag the folder is synchronized against, and
/// whether the folder's child list is static (no new children expected
/// from the repository).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderSync {
    /// Repository connection string, e.g. `:pserver:user@host:/cvsroot`.
    pub root: String,
    /// Repository-relative path of the folder.
    pub repository: String,
    /// Sticky tag, if any.
    pub tag: Option<CvsTag>,
    /// True if the folder's membership is fixed.
    pub is_static: bool,
}

impl FolderSync {
    pub fn new(
        root: impl Into<String>,
        repository: impl Into<String>,
        tag: Option<CvsTag>,
        is_static: bool,
    ) -> Self {
        FolderSync {
            root: root.into(),
            repository: repository.into(),
            tag,
            is_static,
        }
    }

    /// The folder's full remote location.
    pub fn remote_location(&self) -> String {
        format!("{}/{}", self.root, self.repository)
    }
}
