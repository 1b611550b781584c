//! This module provides an in-memory file share: a hierarchy of real directory nodes whose
//! listings are paginated per directory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::core::{
    ByteReader, CopyHandle, CopyStatus, Cursor, DirectoryModel, FileHandle, Page, PageSource,
    Provider, Result, StoreError, utils,
};

const DEFAULT_PAGE_SIZE: usize = 5000;

/// An in-memory file share.
///
/// ### Invariants
///
/// 1. **Root existence**: the share root (`""`) is always a directory and is never stored.
/// 2. **Parent consistency**: for any node `a/b/c` there is a directory node `a/b`.
///
/// Writing or copying a file creates its missing parent directories. Copies within the
/// share finish as soon as they start.
pub struct ShareFS {
    page_size: usize,
    state: Mutex<ShareState>,
}

#[derive(Default)]
struct ShareState {
    nodes: BTreeMap<String, Node>,
    copies: HashMap<u64, CopyStatus>,
    next_copy: u64,
}

enum Node {
    Directory { modified: DateTime<Utc> },
    File { content: Bytes, modified: DateTime<Utc> },
}

impl Default for ShareFS {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareFS {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(ShareState::default()),
        }
    }

    /// Limits the number of entries per listing page (at least one).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Creates the directory `key` and its missing parents.
    pub fn mkdir(&self, key: &str) -> Result<()> {
        let key = utils::normalize_key(key);
        let mut state = self.state();
        state.create_parents(&key)?;
        state.create_dir(&key)
    }

    pub fn is_dir(&self, key: &str) -> bool {
        key.is_empty() || matches!(self.state().nodes.get(key), Some(Node::Directory { .. }))
    }

    pub fn is_file(&self, key: &str) -> bool {
        matches!(self.state().nodes.get(key), Some(Node::File { .. }))
    }

    fn state(&self) -> MutexGuard<'_, ShareState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ShareState {
    fn create_dir(&mut self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        match self.nodes.get(key) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(StoreError::Unsupported(format!(
                "{key} is a file, not a directory"
            ))),
            None => {
                self.nodes.insert(
                    key.to_string(),
                    Node::Directory {
                        modified: Utc::now(),
                    },
                );
                Ok(())
            }
        }
    }

    fn create_parents(&mut self, key: &str) -> Result<()> {
        for ancestor in utils::ancestors(key) {
            self.create_dir(ancestor)?;
        }
        Ok(())
    }

    fn put_file(&mut self, key: &str, content: Bytes) -> Result<()> {
        if matches!(self.nodes.get(key), Some(Node::Directory { .. })) {
            return Err(StoreError::Unsupported(format!("{key} is a directory")));
        }
        self.create_parents(key)?;
        self.nodes.insert(
            key.to_string(),
            Node::File {
                content,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn file_content(&self, key: &str) -> Option<Bytes> {
        match self.nodes.get(key) {
            Some(Node::File { content, .. }) => Some(content.clone()),
            _ => None,
        }
    }

    fn has_children(&self, key: &str) -> bool {
        let prefix = utils::dir_prefix(key);
        self.nodes
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(child, _)| child.starts_with(&prefix))
    }
}

#[async_trait]
impl PageSource for ShareFS {
    async fn list_page(&self, prefix: &str, cursor: Option<&Cursor>) -> Result<Page> {
        let state = self.state();
        if !prefix.is_empty() && !matches!(state.nodes.get(prefix), Some(Node::Directory { .. })) {
            return Err(StoreError::NotFound(prefix.to_string()));
        }

        let dir = utils::dir_prefix(prefix);
        let start = match cursor {
            Some(cursor) => format!("{dir}{}", cursor.as_str()),
            None => dir.clone(),
        };

        let mut children = state
            .nodes
            .range(start..)
            .take_while(|(key, _)| key.starts_with(&dir))
            .filter(|(key, _)| !key[dir.len()..].contains('/'));

        let items: Vec<FileHandle> = children
            .by_ref()
            .take(self.page_size)
            .map(|(key, node)| match node {
                Node::Directory { modified } => FileHandle::directory(key.as_str(), *modified),
                Node::File { content, modified } => {
                    FileHandle::file(key.as_str(), content.len() as u64, *modified)
                }
            })
            .collect();
        let next = children
            .next()
            .map(|(key, _)| Cursor::new(utils::file_name(key)));

        trace!(key = prefix, items = items.len(), more = next.is_some(), "listed share directory");
        Ok(Page::new(items, next))
    }
}

#[async_trait]
impl Provider for ShareFS {
    fn directory_model(&self) -> DirectoryModel {
        DirectoryModel::Native
    }

    async fn open_read(&self, key: &str) -> Result<ByteReader> {
        let content = self
            .state()
            .file_content(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(content)))
    }

    async fn write(&self, key: &str, content: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        let mut buf = Vec::new();
        content.read_to_end(&mut buf).await?;
        self.state().put_file(key, Bytes::from(buf))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        if matches!(state.nodes.get(key), Some(Node::Directory { .. })) {
            return Err(StoreError::Unsupported(format!("{key} is a directory")));
        }
        state.nodes.remove(key);
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<FileHandle> {
        Ok(match self.state().nodes.get(key) {
            Some(Node::File { content, modified }) => {
                FileHandle::file(key, content.len() as u64, *modified)
            }
            _ => FileHandle::not_found(key),
        })
    }

    async fn start_copy(&self, source: &str, target: &str) -> Result<CopyHandle> {
        let mut state = self.state();
        let content = state
            .file_content(source)
            .ok_or_else(|| StoreError::NotFound(source.to_string()))?;
        state.put_file(target, content)?;

        let id = state.next_copy;
        state.next_copy += 1;
        state.copies.insert(id, CopyStatus::Success);
        Ok(CopyHandle::new(id, source, target))
    }

    async fn poll_copy(&self, handle: &CopyHandle) -> Result<CopyStatus> {
        self.state()
            .copies
            .remove(&handle.id())
            .ok_or_else(|| StoreError::NotFound(format!("copy {}", handle.id())))
    }

    async fn directory_exists(&self, key: &str) -> Result<bool> {
        Ok(self.is_dir(key))
    }

    async fn delete_directory_node(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        match state.nodes.get(key) {
            None => return Ok(()),
            Some(Node::File { .. }) => {
                return Err(StoreError::Unsupported(format!("{key} is a file")));
            }
            Some(Node::Directory { .. }) => {}
        }
        if state.has_children(key) {
            return Err(StoreError::Provider(anyhow!("directory {key} is not empty")));
        }
        state.nodes.remove(key);
        Ok(())
    }
}
