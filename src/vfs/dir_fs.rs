//! This module provides a storage provider that maps store keys onto a real directory on the
//! host system.
//!
//! ### Key Features:
//! - **Isolated root**: Every key is joined onto a designated absolute root directory.
//! - **Native directories**: Directories are real nodes; writing a file creates its parents.
//! - **Single-page listings**: A directory is read eagerly and returned as one sorted page.
//! - **Synchronous copies**: A copy is finished when `start_copy` returns.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{trace, warn};

use crate::core::{
    ByteReader, CopyHandle, CopyStatus, Cursor, DirectoryModel, FileHandle, Page, PageSource,
    Provider, Result, StoreError, utils,
};

/// A storage provider backed by a directory on the host filesystem.
///
/// ### Usage notes:
/// - `DirFS` does not follow symlinks when listing; a link is reported by its own type.
/// - Permissions are not adjusted; `root` must be writable.
///
/// ### Example:
/// ```
/// use vfs_store::{DirFS, Provider};
///
/// # tokio_test_block_on(async {
/// let root = std::env::temp_dir().join("vfs_store_doc");
/// let fs = DirFS::new(&root).unwrap();
///
/// let mut content = &b"Hello"[..];
/// fs.write("docs/note.txt", &mut content).await.unwrap();
/// assert!(fs.stat("docs/note.txt").await.unwrap().exists());
///
/// fs.delete("docs/note.txt").await.unwrap();
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
pub struct DirFS {
    root: PathBuf, // host-related absolute normalized path
    copies: AtomicU64,
}

impl DirFS {
    /// Creates a new DirFS with the root directory at `root`.
    /// * `root` is an absolute host path. If it does not exist it will be created.
    ///
    /// Fails if `root` is relative, is not a directory, or is not writable.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();

        if root.as_os_str().is_empty() {
            return Err(StoreError::InvalidPath("root path is empty".to_string()));
        }
        if !root.is_absolute() {
            return Err(StoreError::InvalidPath(format!(
                "the root path must be absolute: {}",
                root.display()
            )));
        }

        let root = normalize(root);
        if root.exists() && !root.is_dir() {
            return Err(StoreError::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        if !root.exists() {
            std::fs::create_dir_all(&root)
                .with_context(|| format!("cannot create root {}", root.display()))
                .map_err(StoreError::Provider)?;
        }

        if !Self::check_permissions(&root) {
            return Err(StoreError::Provider(anyhow!(
                "access denied: {}",
                root.display()
            )));
        }

        Ok(Self {
            root,
            copies: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of a store key.
    pub fn to_host(&self, key: &str) -> PathBuf {
        let mut host = self.root.clone();
        host.extend(utils::segments(key));
        host
    }

    fn check_permissions<P: AsRef<Path>>(path: P) -> bool {
        let filename = path.as_ref().join(".access");
        if std::fs::write(&filename, b"check").is_err() {
            return false;
        }
        std::fs::remove_file(filename).is_ok()
    }

    async fn create_parent(&self, host: &Path, key: &str) -> Result<()> {
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::from_io(err, key))?;
        }
        Ok(())
    }
}

#[async_trait]
impl PageSource for DirFS {
    async fn list_page(&self, prefix: &str, _cursor: Option<&Cursor>) -> Result<Page> {
        let host = self.to_host(prefix);
        let mut reader = fs::read_dir(&host)
            .await
            .map_err(|err| StoreError::from_io(err, prefix))?;

        let mut items = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    warn!(?name, "skipping entry with a non UTF-8 name");
                    continue;
                }
            };
            let metadata = entry.metadata().await?;
            let key = utils::join_key(prefix, &name);
            let modified = modified(metadata.modified());
            items.push(if metadata.is_dir() {
                FileHandle::directory(key, modified)
            } else {
                FileHandle::file(key, metadata.len(), modified)
            });
        }
        items.sort_by(|a, b| a.name().cmp(b.name()));

        trace!(key = prefix, items = items.len(), "read directory");
        Ok(Page::last(items))
    }
}

#[async_trait]
impl Provider for DirFS {
    fn directory_model(&self) -> DirectoryModel {
        DirectoryModel::Native
    }

    async fn open_read(&self, key: &str) -> Result<ByteReader> {
        let host = self.to_host(key);
        let metadata = fs::metadata(&host)
            .await
            .map_err(|err| StoreError::from_io(err, key))?;
        if metadata.is_dir() {
            return Err(StoreError::NotFound(format!("{key} is a directory, not a file")));
        }
        let file = fs::File::open(&host)
            .await
            .map_err(|err| StoreError::from_io(err, key))?;
        Ok(Box::new(file))
    }

    async fn write(&self, key: &str, content: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        let host = self.to_host(key);
        if host.is_dir() {
            return Err(StoreError::Unsupported(format!("{key} is a directory")));
        }
        self.create_parent(&host, key).await?;

        let mut file = fs::File::create(&host)
            .await
            .map_err(|err| StoreError::from_io(err, key))?;
        tokio::io::copy(content, &mut file).await?;
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.to_host(key)).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    async fn stat(&self, key: &str) -> Result<FileHandle> {
        match fs::metadata(self.to_host(key)).await {
            Ok(metadata) if metadata.is_file() => Ok(FileHandle::file(
                key,
                metadata.len(),
                modified(metadata.modified()),
            )),
            Ok(_) => Ok(FileHandle::not_found(key)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(FileHandle::not_found(key))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn start_copy(&self, source: &str, target: &str) -> Result<CopyHandle> {
        let from = self.to_host(source);
        let to = self.to_host(target);

        if !self.stat(source).await?.exists() {
            return Err(StoreError::NotFound(source.to_string()));
        }
        self.create_parent(&to, target).await?;
        fs::copy(&from, &to)
            .await
            .map_err(|err| StoreError::from_io(err, source))?;

        let id = self.copies.fetch_add(1, Ordering::Relaxed);
        Ok(CopyHandle::new(id, source, target))
    }

    async fn poll_copy(&self, _handle: &CopyHandle) -> Result<CopyStatus> {
        Ok(CopyStatus::Success)
    }

    async fn directory_exists(&self, key: &str) -> Result<bool> {
        match fs::metadata(self.to_host(key)).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_directory_node(&self, key: &str) -> Result<()> {
        match fs::remove_dir(self.to_host(key)).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// Lexically collapses `.` and `..` in a host path.
fn normalize<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            _ => result.push(component),
        }
    }
    result
}

fn modified(time: std::io::Result<SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
