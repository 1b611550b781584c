//! A uniform, async file-store API over interchangeable storage backends.
//! Provides one set of operations for a local directory, an object store with inferred
//! directories, and a file share with real directory nodes.
//!
//! ### Overview
//!
//! `vfs-store` defines the [`FileStore`] trait and a generic [`Store`] that implements it
//! on top of any [`Provider`]. The providers only offer primitive calls (open, write,
//! delete, stat, list one page, start and poll a copy); the store composes them into
//! recursive deletes, polled copies, renames and lazily paginated listings.
//!
//! **Key ideas**:
//! - **Sandboxing**: Every caller path is resolved lexically against the store root;
//!   absolute paths and `..` escapes are rejected before any backend call.
//! - **Lazy listings**: Directory contents are fetched page by page, only as entries are consumed.
//! - **Cancellation**: One [`CancellationToken`] is observed at every page fetch, copy
//!   poll and stream read of an operation.
//! - **Typed outcomes**: Queries return not-found values, mutations return [`StoreError`] kinds.
//!
//! ```
//! use vfs_store::{Backend, BlobKind, CancellationToken, StoreConfig, open_store};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = open_store(&StoreConfig::new("/data"), Backend::Blob(BlobKind::Block)).unwrap();
//! let cancel = CancellationToken::new();
//!
//! store.save_text("reports/2024.csv", "a,b", &cancel).await.unwrap();
//! let listing = store.get_directory_contents("reports", &cancel).await.unwrap();
//! assert!(listing.exists());
//!
//! store.delete_directory("reports", &cancel).await.unwrap();
//! assert!(!store.get_file_info("reports/2024.csv", &cancel).await.unwrap().exists());
//! # });
//! ```

mod composite;
mod config;
mod core;
mod listing;
mod store;
mod stream;
mod vfs;

pub use config::{Backend, ConfigError, StoreConfig};
pub use crate::core::{
    ByteReader, CancellationToken, CaseSensitivity, CopyHandle, CopyStatus, Cursor,
    DirectoryModel, EntryType, FileHandle, Page, PageSource, PathSandbox, Provider, Result,
    SandboxedPath, StoreError, resolve,
};
pub use listing::{DirectoryListing, Lister, PagedEnumerator};
pub use store::{FileStore, Store, open_store};
pub use stream::FileStream;
pub use vfs::{BlobFS, BlobKind, DirFS, ShareFS};
