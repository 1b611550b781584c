//! The public file-store facade.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::composite::Operations;
use crate::config::{Backend, StoreConfig};
use crate::core::{CancellationToken, FileHandle, PathSandbox, Provider, Result};
use crate::listing::DirectoryListing;
use crate::stream::FileStream;
use crate::vfs::{BlobFS, DirFS, ShareFS};

/// File operations over one storage backend.
///
/// Every path is relative to the store root; absolute paths and paths that climb out of
/// the root are rejected before any backend call. Queries report absence through
/// not-found values, mutating operations through [`StoreError`](crate::StoreError).
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Copies a file, overwriting the target. Missing source fails with `NotFound`.
    async fn copy_file(
        &self,
        source_path: &str,
        target_path: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Removes a directory and everything below it. A missing directory is not an error.
    async fn delete_directory(&self, path: &str, cancel: &CancellationToken) -> Result<()>;

    /// Removes a file. A missing file is not an error.
    async fn delete_file(&self, path: &str, cancel: &CancellationToken) -> Result<()>;

    async fn get_directory_contents(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<DirectoryListing>;

    /// Describes a file, or returns [`FileHandle::not_found`] when there is none.
    async fn get_file_info(&self, path: &str, cancel: &CancellationToken) -> Result<FileHandle>;

    async fn get_file_stream(&self, path: &str, cancel: &CancellationToken) -> Result<FileStream>;

    /// Moves a file by copying it and deleting the source. Not atomic.
    async fn rename_file(
        &self,
        source_path: &str,
        target_path: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Creates or replaces a file with everything readable from `content`.
    async fn save_file(
        &self,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Creates or replaces a file with UTF-8 text.
    async fn save_text(&self, path: &str, text: &str, cancel: &CancellationToken) -> Result<()> {
        let mut content = text.as_bytes();
        self.save_file(path, &mut content, cancel).await
    }
}

/// A [`FileStore`] over a single [`Provider`].
pub struct Store<P> {
    sandbox: PathSandbox,
    ops: Operations<P>,
}

impl<P: Provider + 'static> Store<P> {
    pub fn new(provider: P, config: &StoreConfig) -> Result<Self> {
        let sandbox = PathSandbox::new(&config.root, config.case_sensitivity)?;
        debug!(root = sandbox.root(), "store opened");
        Ok(Self {
            sandbox,
            ops: Operations::new(
                Arc::new(provider),
                config.copy_poll_interval,
                config.case_sensitivity,
            ),
        })
    }

    pub fn provider(&self) -> &P {
        self.ops.provider()
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    fn key(&self, path: &str) -> Result<String> {
        Ok(self.sandbox.resolve(path)?.key().to_string())
    }
}

#[async_trait]
impl<P: Provider + 'static> FileStore for Store<P> {
    async fn copy_file(
        &self,
        source_path: &str,
        target_path: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let source = self.key(source_path)?;
        let target = self.key(target_path)?;
        self.ops.copy_file(&source, &target, cancel).await
    }

    async fn delete_directory(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        let key = self.key(path)?;
        self.ops.delete_directory(&key, cancel).await
    }

    async fn delete_file(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        let key = self.key(path)?;
        self.ops.delete_file(&key, cancel).await
    }

    async fn get_directory_contents(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<DirectoryListing> {
        let key = self.key(path)?;
        self.ops.get_directory_contents(&key, path, cancel).await
    }

    async fn get_file_info(&self, path: &str, cancel: &CancellationToken) -> Result<FileHandle> {
        let key = self.key(path)?;
        cancel.check()?;
        if key.is_empty() {
            return Ok(FileHandle::not_found(path));
        }
        let info = self.ops.provider().stat(&key).await?;
        if info.exists() {
            Ok(info)
        } else {
            Ok(FileHandle::not_found(path))
        }
    }

    async fn get_file_stream(&self, path: &str, cancel: &CancellationToken) -> Result<FileStream> {
        let key = self.key(path)?;
        self.ops.get_file_stream(&key, cancel).await
    }

    async fn rename_file(
        &self,
        source_path: &str,
        target_path: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let source = self.key(source_path)?;
        let target = self.key(target_path)?;
        self.ops.rename_file(&source, &target, cancel).await
    }

    async fn save_file(
        &self,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let key = self.key(path)?;
        self.ops.save_file(&key, content, cancel).await
    }
}

/// Opens a store over the selected backend.
///
/// The disk backend uses `config.root` as its host directory; the in-memory backends
/// start empty.
pub fn open_store(config: &StoreConfig, backend: Backend) -> Result<Box<dyn FileStore>> {
    let store: Box<dyn FileStore> = match backend {
        Backend::Disk => Box::new(Store::new(DirFS::new(&config.root)?, config)?),
        Backend::Blob(kind) => Box::new(Store::new(BlobFS::new(kind), config)?),
        Backend::Share => Box::new(Store::new(ShareFS::new(), config)?),
    };
    debug!(%backend, "backend selected");
    Ok(store)
}
