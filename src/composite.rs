//! Multi-step operations built on top of the provider primitives.
//!
//! Every step is awaited in sequence; nothing here spawns tasks or retries. All keys are
//! already sandboxed root-relative keys.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::AsyncRead;
use tracing::{debug, trace, warn};

use crate::core::{
    CancellationToken, CaseSensitivity, CopyHandle, CopyStatus, DirectoryModel, Provider,
    Result, StoreError,
};
use crate::listing::{DirectoryListing, Lister};
use crate::stream::FileStream;

pub(crate) struct Operations<P> {
    provider: Arc<P>,
    lister: Lister,
    poll_interval: Duration,
    case: CaseSensitivity,
}

impl<P: Provider + 'static> Operations<P> {
    pub(crate) fn new(provider: Arc<P>, poll_interval: Duration, case: CaseSensitivity) -> Self {
        let lister = Lister::new(provider.clone());
        Self {
            provider,
            lister,
            poll_interval,
            case,
        }
    }

    pub(crate) fn provider(&self) -> &P {
        &self.provider
    }

    /// Lists the directory `key`. `requested` is the caller's path, echoed back when
    /// the directory does not exist.
    pub(crate) async fn get_directory_contents(
        &self,
        key: &str,
        requested: &str,
        cancel: &CancellationToken,
    ) -> Result<DirectoryListing> {
        cancel.check()?;
        let mut entries = self.lister.enumerate(key, cancel.clone());

        let exists = match self.provider.directory_model() {
            DirectoryModel::Native => self.provider.directory_exists(key).await?,
            // primes the first page; the enumerator keeps it buffered
            DirectoryModel::Inferred => entries.peek().await?.is_some(),
        };

        trace!(key, exists, "directory lookup");
        if exists {
            Ok(DirectoryListing::found(key, entries))
        } else {
            Ok(DirectoryListing::not_found(requested))
        }
    }

    /// Removes `key` and everything below it, children before parents.
    pub(crate) fn delete_directory<'a>(
        &'a self,
        key: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut listing = self.get_directory_contents(key, key, cancel).await?;
            if !listing.exists() {
                debug!(key, "directory already absent");
                return Ok(());
            }

            while let Some(entry) = listing.next().await? {
                let Some(child) = entry.path() else {
                    continue;
                };
                if entry.is_dir() {
                    self.delete_directory(child, cancel).await?;
                } else {
                    cancel.check()?;
                    self.provider.delete(child).await?;
                    trace!(key = child, "deleted file");
                }
            }

            if self.provider.directory_model() == DirectoryModel::Native && !key.is_empty() {
                cancel.check()?;
                self.provider.delete_directory_node(key).await?;
            }
            debug!(key, "deleted directory");
            Ok(())
        })
    }

    pub(crate) async fn delete_file(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        cancel.check()?;
        self.provider.delete(key).await
    }

    /// Starts a copy and polls it until it reaches a terminal status.
    ///
    /// Copying a file onto itself only checks that it exists.
    pub(crate) async fn copy_file(
        &self,
        source: &str,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancel.check()?;
        ensure_not_root(target)?;
        if self.case.same(source, target) {
            return self.ensure_file(source).await;
        }

        let handle = self.provider.start_copy(source, target).await?;
        debug!(source, target, copy = handle.id(), "copy started");

        let mut polls = 0u32;
        loop {
            if let Err(err) = cancel.check() {
                self.abandon_copy(&handle, polls).await;
                return Err(err);
            }
            let status = self.provider.poll_copy(&handle).await?;
            polls += 1;
            match status {
                CopyStatus::Success => {
                    debug!(source, target, polls, "copy finished");
                    return Ok(());
                }
                CopyStatus::Failed => {
                    warn!(source, target, polls, "copy failed");
                    return Err(StoreError::transfer_failed(
                        source,
                        target,
                        "copy ended with a failed status",
                    ));
                }
                CopyStatus::Pending => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    /// Copies `source` to `target`, then deletes `source`.
    pub(crate) async fn rename_file(
        &self,
        source: &str,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.case.same(source, target) {
            cancel.check()?;
            return self.ensure_file(source).await;
        }

        self.copy_file(source, target, cancel).await?;

        if let Err(err) = cancel.check() {
            warn!(source, target, "rename interrupted after copy, source kept");
            return Err(err);
        }
        self.provider.delete(source).await.inspect_err(|err| {
            warn!(source, target, error = %err, "rename copied but could not remove source");
        })
    }

    pub(crate) async fn save_file(
        &self,
        key: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancel.check()?;
        ensure_not_root(key)?;

        let mut reader = FileStream::new(content, cancel.clone());
        self.provider.write(key, &mut reader).await?;
        debug!(key, "saved file");
        Ok(())
    }

    pub(crate) async fn get_file_stream(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<FileStream> {
        cancel.check()?;
        let reader = self.provider.open_read(key).await?;
        Ok(FileStream::new(reader, cancel.clone()))
    }

    async fn ensure_file(&self, key: &str) -> Result<()> {
        if self.provider.stat(key).await?.exists() {
            Ok(())
        } else {
            Err(StoreError::NotFound(key.to_string()))
        }
    }

    async fn abandon_copy(&self, handle: &CopyHandle, polls: u32) {
        warn!(
            source = handle.source(),
            target = handle.target(),
            polls,
            "copy cancelled while pending"
        );
        if let Err(err) = self.provider.abort_copy(handle).await {
            warn!(copy = handle.id(), error = %err, "could not abort copy");
        }
    }
}

fn ensure_not_root(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidPath(
            "the store root is not a file".to_string(),
        ));
    }
    Ok(())
}
