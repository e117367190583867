//! Error types for sync record parsing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntriesError {
    #[error("malformed sync record at offset {offset}: {reason}")]
    MalformedSyncRecord { offset: usize, reason: &'static str },

    #[error("invalid tag specification: {0}")]
    InvalidTag(String),

    #[error("invalid notify record: {0}")]
    InvalidNotify(String),

    #[error("invalid baserev record: {0}")]
    InvalidBaserev(String),
}

impl EntriesError {
    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        EntriesError::MalformedSyncRecord { offset, reason }
    }
}

pub type Result<T> = std::result::Result<T, EntriesError>;
