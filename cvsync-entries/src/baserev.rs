//! Base-revision records for offline edit
//!
//! One record per edited file, stored as a line of the parent folder's
//! baserev file: `B<name>/<revision>/`. The base revision names the
//! pristine copy held in the folder's base directory.

use serde::{Deserialize, Serialize};

use crate::errors::{EntriesError, Result};

const BASEREV_PREFIX: char = 'B';

/// The revision a file's pristine base copy was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaserevInfo {
    name: String,
    revision: String,
}

impl BaserevInfo {
    pub fn new(name: impl Into<String>, revision: impl Into<String>) -> Self {
        BaserevInfo {
            name: name.into(),
            revision: revision.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Parse one line of a baserev file.
    pub fn from_line(line: &str) -> Result<Self> {
        let rest = line
            .strip_prefix(BASEREV_PREFIX)
            .ok_or_else(|| EntriesError::InvalidBaserev(line.to_string()))?;
        let mut fields = rest.split('/');
        match (fields.next(), fields.next()) {
            (Some(name), Some(revision)) if !name.is_empty() && !revision.is_empty() => {
                Ok(BaserevInfo::new(name, revision))
            }
            _ => Err(EntriesError::InvalidBaserev(line.to_string())),
        }
    }

    /// The baserev file line for this record.
    pub fn to_line(&self) -> String {
        format!("{BASEREV_PREFIX}{}/{}/", self.name, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_round_trip() {
        let info = BaserevInfo::from_line("BMain.java/1.42/").unwrap();
        assert_eq!(info.name(), "Main.java");
        assert_eq!(info.revision(), "1.42");
        assert_eq!(info.to_line(), "BMain.java/1.42/");
    }

    #[test]
    fn rejects_missing_prefix_or_fields() {
        assert!(BaserevInfo::from_line("Main.java/1.42/").is_err());
        assert!(BaserevInfo::from_line("B/1.42/").is_err());
        assert!(BaserevInfo::from_line("BMain.java//").is_err());
    }
}
