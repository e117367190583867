//! Edit/unedit notification records
//!
//! One record per file name, stored as a line of the parent folder's
//! notify file: `name/kind/timestamp/watches`.

use serde::{Deserialize, Serialize};

use crate::errors::{EntriesError, Result};

/// The kind of notification pending for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyKind {
    Edit,
    Unedit,
    Commit,
}

impl NotifyKind {
    fn letter(self) -> char {
        match self {
            NotifyKind::Edit => 'E',
            NotifyKind::Unedit => 'U',
            NotifyKind::Commit => 'C',
        }
    }

    fn from_letter(s: &str) -> Option<Self> {
        match s {
            "E" => Some(NotifyKind::Edit),
            "U" => Some(NotifyKind::Unedit),
            "C" => Some(NotifyKind::Commit),
            _ => None,
        }
    }
}

/// A pending notification for one file, keyed by name within its folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotifyInfo {
    name: String,
    kind: NotifyKind,
    timestamp: String,
    /// Watch kinds of interest, a subset string of `EUC`.
    watches: String,
}

impl NotifyInfo {
    pub fn new(
        name: impl Into<String>,
        kind: NotifyKind,
        timestamp: impl Into<String>,
        watches: impl Into<String>,
    ) -> Result<Self> {
        let watches = watches.into();
        if watches.chars().any(|c| !"EUC".contains(c)) {
            return Err(EntriesError::InvalidNotify(format!(
                "invalid watches '{watches}'"
            )));
        }
        Ok(NotifyInfo {
            name: name.into(),
            kind,
            timestamp: timestamp.into(),
            watches,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NotifyKind {
        self.kind
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn watches(&self) -> &str {
        &self.watches
    }

    /// Parse one line of a notify file.
    pub fn from_line(line: &str) -> Result<Self> {
        let mut fields = line.splitn(4, '/');
        let name = fields
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| EntriesError::InvalidNotify(line.to_string()))?;
        let kind = fields
            .next()
            .and_then(NotifyKind::from_letter)
            .ok_or_else(|| EntriesError::InvalidNotify(line.to_string()))?;
        let timestamp = fields
            .next()
            .ok_or_else(|| EntriesError::InvalidNotify(line.to_string()))?;
        let watches = fields.next().unwrap_or_default();
        NotifyInfo::new(name, kind, timestamp, watches)
    }

    /// The notify file line for this record.
    pub fn to_line(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.name,
            self.kind.letter(),
            self.timestamp,
            self.watches
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_round_trip() {
        let line = "Main.java/E/Thu Apr 12 12:45:00 2001 GMT/EUC";
        let info = NotifyInfo::from_line(line).unwrap();
        assert_eq!(info.name(), "Main.java");
        assert_eq!(info.kind(), NotifyKind::Edit);
        assert_eq!(info.watches(), "EUC");
        assert_eq!(info.to_line(), line);
    }

    #[test]
    fn rejects_garbage() {
        assert!(NotifyInfo::from_line("").is_err());
        assert!(NotifyInfo::from_line("name/Q/ts/E").is_err());
        assert!(NotifyInfo::new("f", NotifyKind::Edit, "ts", "XYZ").is_err());
    }
}
