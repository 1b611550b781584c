//! This module provides an in-memory object store with flat keys and inferred directories.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::core::{
    ByteReader, CopyHandle, CopyStatus, Cursor, DirectoryModel, FileHandle, Page, PageSource,
    Provider, Result, StoreError, utils,
};

/// Largest page a listing returns by default.
const DEFAULT_PAGE_SIZE: usize = 5000;

/// How writes treat an existing object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BlobKind {
    /// Writes replace the whole object.
    #[default]
    Block,
    /// Writes append to the object, creating it when missing.
    Append,
    /// Random-access objects; writing through the store is not supported.
    Page,
}

/// An object store kept in memory.
///
/// Keys are flat strings; a "directory" exists only while some key carries its prefix,
/// so deleting the last file of a directory makes the directory disappear. Listings
/// group keys by the `/` delimiter and come back in pages of at most `page_size` entries.
///
/// Copies are asynchronous: the content is captured when the copy starts and the target
/// appears only once a poll reports success.
///
/// ### Example
///
/// ```
/// use vfs_store::{BlobFS, BlobKind};
///
/// let fs = BlobFS::new(BlobKind::Block)
///     .with_page_size(100)
///     .with_copy_latency(2);
///
/// fs.fail_copies_to("reports/broken.csv");
/// assert_eq!(fs.len(), 0);
/// ```
pub struct BlobFS {
    kind: BlobKind,
    page_size: usize,
    empty_pages: bool,
    copy_latency: u32,
    state: Mutex<BlobState>,
}

#[derive(Default)]
struct BlobState {
    blobs: BTreeMap<String, Blob>,
    copies: HashMap<u64, PendingCopy>,
    failing_targets: HashSet<String>,
    next_copy: u64,
}

struct Blob {
    content: Bytes,
    modified: DateTime<Utc>,
}

struct PendingCopy {
    target: String,
    content: Bytes,
    polls_left: u32,
}

/// Position inside a listing; `dir` sorts a directory after a file of the same name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Position {
    name: String,
    dir: bool,
}

impl BlobFS {
    pub fn new(kind: BlobKind) -> Self {
        Self {
            kind,
            page_size: DEFAULT_PAGE_SIZE,
            empty_pages: false,
            copy_latency: 0,
            state: Mutex::new(BlobState::default()),
        }
    }

    /// Limits the number of entries per listing page (at least one).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Inserts an empty page, still carrying a continuation cursor, before every
    /// real page of a listing.
    pub fn with_empty_pages(mut self, enabled: bool) -> Self {
        self.empty_pages = enabled;
        self
    }

    /// Number of polls a copy reports `Pending` before it finishes.
    pub fn with_copy_latency(mut self, polls: u32) -> Self {
        self.copy_latency = polls;
        self
    }

    /// Makes every later copy into `target` end with a failed status.
    pub fn fail_copies_to(&self, target: impl Into<String>) {
        self.state().failing_targets.insert(target.into());
    }

    pub fn kind(&self) -> BlobKind {
        self.kind
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().blobs.contains_key(key)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.state().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of copies started but not yet finished or aborted.
    pub fn pending_copies(&self) -> usize {
        self.state().copies.len()
    }

    fn state(&self) -> MutexGuard<'_, BlobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Immediate children of `prefix`, starting at `from`.
    fn children(&self, prefix: &str, from: &Position) -> BTreeMap<Position, FileHandle> {
        let dir = utils::dir_prefix(prefix);
        let state = self.state();

        let mut children = BTreeMap::new();
        for (key, blob) in state.blobs.range(dir.clone()..) {
            let Some(rest) = key.strip_prefix(&dir) else {
                break;
            };
            let (position, entry) = match rest.split_once('/') {
                Some((name, _)) => (
                    Position {
                        name: name.to_string(),
                        dir: true,
                    },
                    FileHandle::directory(utils::join_key(prefix, name), blob.modified),
                ),
                None => (
                    Position {
                        name: rest.to_string(),
                        dir: false,
                    },
                    FileHandle::file(key.as_str(), blob.content.len() as u64, blob.modified),
                ),
            };
            if &position >= from {
                children.entry(position).or_insert(entry);
            }
        }
        children
    }
}

impl Position {
    fn start() -> Self {
        Self {
            name: String::new(),
            dir: false,
        }
    }

    fn encode(&self) -> String {
        format!("{}:{}", if self.dir { 'd' } else { 'f' }, self.name)
    }

    fn decode(token: &str) -> Result<Self> {
        let (kind, name) = token
            .split_once(':')
            .ok_or_else(|| StoreError::Provider(anyhow!("malformed continuation token")))?;
        let dir = match kind {
            "d" => true,
            "f" => false,
            _ => return Err(StoreError::Provider(anyhow!("malformed continuation token"))),
        };
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }
}

/// Marks a cursor that must first produce an empty page.
const EMPTY_PAGE_MARK: char = '~';

#[async_trait]
impl PageSource for BlobFS {
    async fn list_page(&self, prefix: &str, cursor: Option<&Cursor>) -> Result<Page> {
        let from = match cursor {
            None if self.empty_pages => {
                let next = Cursor::new(Position::start().encode());
                return Ok(Page::new(Vec::new(), Some(next)));
            }
            None => Position::start(),
            Some(cursor) => match cursor.as_str().strip_prefix(EMPTY_PAGE_MARK) {
                Some(inner) => return Ok(Page::new(Vec::new(), Some(Cursor::new(inner)))),
                None => Position::decode(cursor.as_str())?,
            },
        };

        let mut children = self.children(prefix, &from).into_iter();
        let items: Vec<FileHandle> = children
            .by_ref()
            .take(self.page_size)
            .map(|(_, entry)| entry)
            .collect();
        let next = children.next().map(|(position, _)| {
            if self.empty_pages {
                Cursor::new(format!("{EMPTY_PAGE_MARK}{}", position.encode()))
            } else {
                Cursor::new(position.encode())
            }
        });

        trace!(key = prefix, items = items.len(), more = next.is_some(), "listed blobs");
        Ok(Page::new(items, next))
    }
}

#[async_trait]
impl Provider for BlobFS {
    fn directory_model(&self) -> DirectoryModel {
        DirectoryModel::Inferred
    }

    async fn open_read(&self, key: &str) -> Result<ByteReader> {
        let content = self
            .state()
            .blobs
            .get(key)
            .map(|blob| blob.content.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(content)))
    }

    async fn write(&self, key: &str, content: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        if self.kind == BlobKind::Page {
            return Err(StoreError::Unsupported(format!(
                "page blobs cannot be written as a stream: {key}"
            )));
        }

        let mut buf = Vec::new();
        content.read_to_end(&mut buf).await?;

        let mut state = self.state();
        let modified = Utc::now();
        if self.kind == BlobKind::Append {
            if let Some(blob) = state.blobs.get_mut(key) {
                let mut joined = BytesMut::from(&blob.content[..]);
                joined.extend_from_slice(&buf);
                blob.content = joined.freeze();
                blob.modified = modified;
                return Ok(());
            }
        }
        state.blobs.insert(
            key.to_string(),
            Blob {
                content: Bytes::from(buf),
                modified,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state().blobs.remove(key);
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<FileHandle> {
        Ok(match self.state().blobs.get(key) {
            Some(blob) => FileHandle::file(key, blob.content.len() as u64, blob.modified),
            None => FileHandle::not_found(key),
        })
    }

    async fn start_copy(&self, source: &str, target: &str) -> Result<CopyHandle> {
        let mut state = self.state();
        let content = state
            .blobs
            .get(source)
            .map(|blob| blob.content.clone())
            .ok_or_else(|| StoreError::NotFound(source.to_string()))?;

        let id = state.next_copy;
        state.next_copy += 1;
        state.copies.insert(
            id,
            PendingCopy {
                target: target.to_string(),
                content,
                polls_left: self.copy_latency,
            },
        );
        Ok(CopyHandle::new(id, source, target))
    }

    async fn poll_copy(&self, handle: &CopyHandle) -> Result<CopyStatus> {
        let mut state = self.state();
        let pending = state
            .copies
            .get_mut(&handle.id())
            .ok_or_else(|| StoreError::NotFound(format!("copy {}", handle.id())))?;

        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(CopyStatus::Pending);
        }

        let Some(copy) = state.copies.remove(&handle.id()) else {
            return Ok(CopyStatus::Failed);
        };
        if state.failing_targets.contains(&copy.target) {
            return Ok(CopyStatus::Failed);
        }
        state.blobs.insert(
            copy.target,
            Blob {
                content: copy.content,
                modified: Utc::now(),
            },
        );
        Ok(CopyStatus::Success)
    }

    async fn abort_copy(&self, handle: &CopyHandle) -> Result<()> {
        if self.state().copies.remove(&handle.id()).is_some() {
            trace!(copy = handle.id(), target = handle.target(), "copy aborted");
        }
        Ok(())
    }
}
