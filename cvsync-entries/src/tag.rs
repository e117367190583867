//! Sticky tags
//!
//! A tag names the line of development a resource is synchronized against:
//! a branch, an immutable version, a date, or the trunk head. Entry lines
//! and the folder tag file both encode the kind as a single leading letter.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{EntriesError, Result};

/// Sticky date format, e.g. `2001.04.12.12.00.00`.
const DATE_TAG_FORMAT: &str = "%Y.%m.%d.%H.%M.%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Head,
    Branch,
    Version,
    Date,
}

impl TagKind {
    fn letter(self) -> Option<char> {
        match self {
            TagKind::Head => None,
            TagKind::Branch => Some('T'),
            TagKind::Version => Some('N'),
            TagKind::Date => Some('D'),
        }
    }
}

/// A branch, version, or date tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CvsTag {
    kind: TagKind,
    name: String,
}

impl CvsTag {
    pub fn new(kind: TagKind, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if kind != TagKind::Head && name.is_empty() {
            return Err(EntriesError::InvalidTag("empty tag name".to_string()));
        }
        Ok(CvsTag { kind, name })
    }

    /// The trunk head pseudo-tag. Never written to disk.
    pub fn head() -> Self {
        CvsTag {
            kind: TagKind::Head,
            name: "HEAD".to_string(),
        }
    }

    pub fn branch(name: impl Into<String>) -> Result<Self> {
        Self::new(TagKind::Branch, name)
    }

    pub fn version(name: impl Into<String>) -> Result<Self> {
        Self::new(TagKind::Version, name)
    }

    /// A sticky date tag for the given instant.
    pub fn date(time: DateTime<Utc>) -> Self {
        CvsTag {
            kind: TagKind::Date,
            name: time.format(DATE_TAG_FORMAT).to_string(),
        }
    }

    pub fn kind(&self) -> TagKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instant of a date tag, when well-formed.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        if self.kind != TagKind::Date {
            return None;
        }
        NaiveDateTime::parse_from_str(&self.name, DATE_TAG_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Parse the tag slot of an entry line. Empty means head.
    pub fn from_entry_slot(slot: &str) -> Result<Option<Self>> {
        if slot.is_empty() {
            return Ok(None);
        }
        let mut chars = slot.chars();
        let kind = match chars.next() {
            Some('T') => TagKind::Branch,
            Some('N') => TagKind::Version,
            Some('D') => TagKind::Date,
            _ => return Err(EntriesError::InvalidTag(slot.to_string())),
        };
        Ok(Some(Self::new(kind, chars.as_str())?))
    }

    /// The tag slot text for an entry line. Empty for head.
    pub fn entry_slot(&self) -> String {
        match self.kind.letter() {
            Some(letter) => format!("{letter}{}", self.name),
            None => String::new(),
        }
    }

    /// Parse one line of a folder tag file. Same encoding as the entry slot.
    pub fn from_tag_file_line(line: &str) -> Result<Option<Self>> {
        Self::from_entry_slot(line.trim_end())
    }

    /// The tag file line for this tag; `None` for head (file is deleted).
    pub fn tag_file_line(&self) -> Option<String> {
        match self.kind {
            TagKind::Head => None,
            _ => Some(self.entry_slot()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entry_slot_round_trip() {
        for slot in ["Tv2_0", "Nv1_0_rc1", "D2001.04.12.12.00.00"] {
            let tag = CvsTag::from_entry_slot(slot).unwrap().unwrap();
            assert_eq!(tag.entry_slot(), slot);
        }
        assert!(CvsTag::from_entry_slot("").unwrap().is_none());
    }

    #[test]
    fn unknown_kind_letter_rejected() {
        assert!(matches!(
            CvsTag::from_entry_slot("Xv1"),
            Err(EntriesError::InvalidTag(_))
        ));
    }

    #[test]
    fn date_tags_parse() {
        let time = Utc.with_ymd_and_hms(2001, 4, 12, 12, 0, 0).unwrap();
        let tag = CvsTag::date(time);
        assert_eq!(tag.as_date(), Some(time));
        assert_eq!(tag.entry_slot(), "D2001.04.12.12.00.00");
    }

    #[test]
    fn head_is_never_written() {
        let head = CvsTag::head();
        assert_eq!(head.entry_slot(), "");
        assert!(head.tag_file_line().is_none());
    }
}
