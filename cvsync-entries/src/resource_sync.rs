//! Per-resource sync records

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry_line;
use crate::errors::Result;
use crate::tag::CvsTag;

/// Sentinel revision marking a just-added entry that has never been
/// committed to the repository.
pub const ADDED_REVISION: &str = "0";

/// Timestamp text recorded after a clean merge.
pub const MERGED_TIMESTAMP: &str = "Result of merge";

/// Entry timestamp format used by the CVS client family.
const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Keyword-substitution mode for a managed file.
///
/// `Text` is the default expansion applied when the options slot of the
/// entry line is empty. Unknown option strings are preserved verbatim so
/// records written by other clients survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeywordMode {
    #[default]
    Text,
    Kkv,
    Kkvl,
    Kk,
    Ko,
    Kb,
    Kv,
    Other(String),
}

impl KeywordMode {
    /// Parse the options slot of an entry line.
    pub fn from_entry_slot(slot: &str) -> Self {
        match slot {
            "" => KeywordMode::Text,
            "-kkv" => KeywordMode::Kkv,
            "-kkvl" => KeywordMode::Kkvl,
            "-kk" => KeywordMode::Kk,
            "-ko" => KeywordMode::Ko,
            "-kb" => KeywordMode::Kb,
            "-kv" => KeywordMode::Kv,
            other => KeywordMode::Other(other.to_string()),
        }
    }

    /// The options slot text for this mode.
    pub fn entry_slot(&self) -> &str {
        match self {
            KeywordMode::Text => "",
            KeywordMode::Kkv => "-kkv",
            KeywordMode::Kkvl => "-kkvl",
            KeywordMode::Kk => "-kk",
            KeywordMode::Ko => "-ko",
            KeywordMode::Kb => "-kb",
            KeywordMode::Kv => "-kv",
            KeywordMode::Other(s) => s,
        }
    }

    /// True for binary files (`-kb`).
    pub fn is_binary(&self) -> bool {
        matches!(self, KeywordMode::Kb)
    }
}

/// Immutable sync record for a single workspace resource.
///
/// Mirrors one entry line of the parent folder's control directory. The
/// record is a value: mutators return a new record, and `to_bytes` of an
/// unmodified `from_bytes` result reproduces the input bytes for any
/// well-formed line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceSync {
    name: String,
    revision: String,
    deleted: bool,
    timestamp: String,
    keyword_mode: KeywordMode,
    tag: Option<CvsTag>,
    folder: bool,
}

impl ResourceSync {
    /// Record for a managed file at the given revision.
    pub fn file(name: impl Into<String>, revision: impl Into<String>) -> Self {
        ResourceSync {
            name: name.into(),
            revision: revision.into(),
            deleted: false,
            timestamp: String::new(),
            keyword_mode: KeywordMode::default(),
            tag: None,
            folder: false,
        }
    }

    /// Record for a just-added file (sentinel revision).
    pub fn addition(name: impl Into<String>) -> Self {
        Self::file(name, ADDED_REVISION)
    }

    /// Record for a child folder.
    pub fn folder(name: impl Into<String>) -> Self {
        ResourceSync {
            name: name.into(),
            revision: String::new(),
            deleted: false,
            timestamp: String::new(),
            keyword_mode: KeywordMode::default(),
            tag: None,
            folder: true,
        }
    }

    /// Decode sync bytes into a record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if entry_line::is_folder(bytes) {
            return Ok(ResourceSync {
                name: entry_line::name_of(bytes)?.to_string(),
                revision: String::new(),
                deleted: false,
                timestamp: String::new(),
                keyword_mode: KeywordMode::default(),
                tag: None,
                folder: true,
            });
        }
        Ok(ResourceSync {
            name: entry_line::name_of(bytes)?.to_string(),
            revision: entry_line::revision_of(bytes)?.to_string(),
            deleted: entry_line::is_deletion(bytes)?,
            timestamp: entry_line::timestamp_of(bytes)?.to_string(),
            keyword_mode: entry_line::keyword_mode_of(bytes)?,
            tag: entry_line::tag_of(bytes)?,
            folder: false,
        })
    }

    /// Encode the record into canonical sync bytes.
    pub fn to_bytes(&self) -> Bytes {
        if self.folder {
            return entry_line::folder_line(&self.name);
        }
        let deletion = if self.deleted { "-" } else { "" };
        let tag = self
            .tag
            .as_ref()
            .map(CvsTag::entry_slot)
            .unwrap_or_default();
        Bytes::from(format!(
            "/{}/{}{}/{}/{}/{}",
            self.name,
            deletion,
            self.revision,
            self.timestamp,
            self.keyword_mode.entry_slot(),
            tag,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The revision, without any deletion prefix.
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// The raw timestamp slot; empty when none was recorded.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn keyword_mode(&self) -> &KeywordMode {
        &self.keyword_mode
    }

    pub fn tag(&self) -> Option<&CvsTag> {
        self.tag.as_ref()
    }

    pub fn is_folder(&self) -> bool {
        self.folder
    }

    pub fn is_addition(&self) -> bool {
        self.revision == ADDED_REVISION
    }

    pub fn is_deletion(&self) -> bool {
        self.deleted
    }

    /// True if the timestamp records the result of a merge.
    pub fn is_merge_result(&self) -> bool {
        self.timestamp.starts_with(MERGED_TIMESTAMP)
    }

    /// The entry timestamp parsed to UTC, when present and well-formed.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Stamp the record with a modification time in entry format.
    pub fn with_modification_time(mut self, time: DateTime<Utc>) -> Self {
        self.timestamp = time.format(TIMESTAMP_FORMAT).to_string();
        self
    }

    pub fn with_keyword_mode(mut self, mode: KeywordMode) -> Self {
        self.keyword_mode = mode;
        self
    }

    pub fn with_tag(mut self, tag: Option<CvsTag>) -> Self {
        self.tag = tag;
        self
    }

    pub fn as_deletion(mut self) -> Self {
        self.deleted = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Entry lines as written by assorted CVS family clients.
    const CORPUS: &[&str] = &[
        "/plugin.xml/1.14/Thu Apr 12 12:45:00 2001//",
        "/build.properties/1.2/Mon Feb  5 09:14:11 2001/-ko/",
        "/icon.gif/1.1/dummy timestamp/-kb/",
        "/Main.java/1.42/Result of merge//Tv2_0",
        "/notes.txt/0///",
        "/retired.txt/-1.7/Wed Jan 17 22:01:47 2001//Nv1_0",
        "D/src////",
    ];

    #[test]
    fn corpus_round_trips() {
        for line in CORPUS {
            let record = ResourceSync::from_bytes(line.as_bytes()).unwrap();
            assert_eq!(&record.to_bytes()[..], line.as_bytes(), "line: {line}");
        }
    }

    #[test]
    fn classification() {
        let added = ResourceSync::from_bytes(b"/notes.txt/0///").unwrap();
        assert!(added.is_addition());
        assert!(!added.is_deletion());

        let removed =
            ResourceSync::from_bytes(b"/retired.txt/-1.7/Wed Jan 17 22:01:47 2001//Nv1_0")
                .unwrap();
        assert!(removed.is_deletion());
        assert_eq!(removed.revision(), "1.7");

        let folder = ResourceSync::from_bytes(b"D/src////").unwrap();
        assert!(folder.is_folder());
    }

    #[test]
    fn binary_mode_and_merge_markers() {
        let binary = ResourceSync::from_bytes(b"/icon.gif/1.1/dummy timestamp/-kb/").unwrap();
        assert!(binary.keyword_mode().is_binary());

        let merged = ResourceSync::from_bytes(b"/Main.java/1.42/Result of merge//Tv2_0").unwrap();
        assert!(merged.is_merge_result());
        assert!(merged.parsed_timestamp().is_none());
    }

    #[test]
    fn timestamp_parses_to_utc() {
        let record = ResourceSync::from_bytes(CORPUS[0].as_bytes()).unwrap();
        let expected = Utc.with_ymd_and_hms(2001, 4, 12, 12, 45, 0).unwrap();
        assert_eq!(record.parsed_timestamp(), Some(expected));
    }

    #[test]
    fn builders_encode_canonically() {
        let time = Utc.with_ymd_and_hms(2001, 4, 12, 12, 45, 0).unwrap();
        let record = ResourceSync::file("plugin.xml", "1.14").with_modification_time(time);
        assert_eq!(
            &record.to_bytes()[..],
            b"/plugin.xml/1.14/Thu Apr 12 12:45:00 2001//" as &[u8]
        );
        assert_eq!(&ResourceSync::addition("a.txt").to_bytes()[..], b"/a.txt/0///");
    }
}
