use chrono::{DateTime, Utc};

use crate::core::utils;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

/// Description of a file or directory as reported by a provider.
///
/// `path` is the root-relative key of the entry and can be fed back into any store call.
/// A "not found" handle has `exists == false`, `length == -1` and no `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHandle {
    exists: bool,
    entry_type: EntryType,
    name: String,
    path: Option<String>,
    length: i64,
    last_modified: DateTime<Utc>,
}

impl FileHandle {
    pub fn file(key: impl Into<String>, length: u64, last_modified: DateTime<Utc>) -> FileHandle {
        let key = key.into();
        FileHandle {
            exists: true,
            entry_type: EntryType::File,
            name: utils::file_name(&key).to_string(),
            path: Some(key),
            length: i64::try_from(length).unwrap_or(i64::MAX),
            last_modified,
        }
    }

    pub fn directory(key: impl Into<String>, last_modified: DateTime<Utc>) -> FileHandle {
        let key = key.into();
        FileHandle {
            exists: true,
            entry_type: EntryType::Directory,
            name: utils::file_name(&key).to_string(),
            path: Some(key),
            length: -1,
            last_modified,
        }
    }

    /// Sentinel for an absent file. `name` keeps the path that was asked for.
    pub fn not_found(requested: impl Into<String>) -> FileHandle {
        FileHandle {
            exists: false,
            entry_type: EntryType::File,
            name: requested.into(),
            path: None,
            length: -1,
            last_modified: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn is_file(&self) -> bool {
        self.exists && self.entry_type == EntryType::File
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Size in bytes, `-1` when unknown.
    pub fn length(&self) -> i64 {
        self.length
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}
