//! Dirty indicators
//!
//! Each resource carries a tri-state modification marker that is
//! propagated to its ancestors, so "is this subtree clean" is answerable
//! without walking children. `Recompute` means the cached answer is stale
//! and must be re-derived by inspecting children.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirtyIndicator {
    IsDirty,
    NotDirty,
    Recompute,
}

impl DirtyIndicator {
    /// The indicator an ancestor takes when a descendant changes to
    /// `self`: dirtiness propagates, everything else forces a recompute.
    pub fn ancestor_indicator(self) -> DirtyIndicator {
        match self {
            DirtyIndicator::IsDirty => DirtyIndicator::IsDirty,
            DirtyIndicator::NotDirty | DirtyIndicator::Recompute => DirtyIndicator::Recompute,
        }
    }
}

/// The externally visible modification state derived from an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationState {
    Dirty,
    Clean,
    Unknown,
}

impl ModificationState {
    /// An absent or stale indicator reads as unknown; the caller is
    /// expected to recompute by inspecting children.
    pub fn from_indicator(indicator: Option<DirtyIndicator>) -> Self {
        match indicator {
            Some(DirtyIndicator::IsDirty) => ModificationState::Dirty,
            Some(DirtyIndicator::NotDirty) => ModificationState::Clean,
            Some(DirtyIndicator::Recompute) | None => ModificationState::Unknown,
        }
    }
}
