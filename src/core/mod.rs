use async_trait::async_trait;
use tokio::io::AsyncRead;

mod cancel;
mod entry;
mod error;
pub(crate) mod path;
pub(crate) mod utils;

pub use cancel::CancellationToken;
pub use entry::{EntryType, FileHandle};
pub use error::StoreError;
pub(crate) use error::cancelled_io;
pub use path::{CaseSensitivity, PathSandbox, SandboxedPath, resolve};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Readable byte source handed out by providers.
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// How a backend represents directories.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DirectoryModel {
    /// Directories are real nodes that must be created and removed.
    Native,
    /// A directory exists only while at least one key carries its prefix.
    Inferred,
}

/// Opaque continuation token issued by a paginated listing.
///
/// Only the provider that issued a cursor interprets it.
#[derive(Debug, Clone)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One bounded slice of a listing.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<FileHandle>,
    pub next: Option<Cursor>,
}

impl Page {
    pub fn new(items: Vec<FileHandle>, next: Option<Cursor>) -> Self {
        Self { items, next }
    }

    /// A page that ends the listing.
    pub fn last(items: Vec<FileHandle>) -> Self {
        Self { items, next: None }
    }
}

/// Status of a backend copy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    Pending,
    Success,
    Failed,
}

impl CopyStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CopyStatus::Pending)
    }
}

/// Identifies an in-flight copy started by [`Provider::start_copy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyHandle {
    id: u64,
    source: String,
    target: String,
}

impl CopyHandle {
    pub fn new(id: u64, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// The page-fetch primitive a listing is built from.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Returns one page of the immediate children of the directory `prefix`
    /// (`""` is the store root). `cursor` is `None` for the first page.
    async fn list_page(&self, prefix: &str, cursor: Option<&Cursor>) -> Result<Page>;
}

/// Capability set every storage backend exposes to the store.
///
/// All keys are root-relative and already sandboxed. Backend failures are translated
/// into [`StoreError`] kinds before they leave an implementation.
#[async_trait]
pub trait Provider: PageSource {
    fn directory_model(&self) -> DirectoryModel;

    /// Opens `key` for reading. Fails with `NotFound` when absent.
    async fn open_read(&self, key: &str) -> Result<ByteReader>;

    /// Creates or replaces `key` with everything readable from `content`.
    async fn write(&self, key: &str, content: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()>;

    /// Removes the file `key`. Absent files are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Describes the file `key`, or returns [`FileHandle::not_found`].
    async fn stat(&self, key: &str) -> Result<FileHandle>;

    /// Starts copying `source` to `target`. Fails with `NotFound` if `source` is absent.
    async fn start_copy(&self, source: &str, target: &str) -> Result<CopyHandle>;

    async fn poll_copy(&self, handle: &CopyHandle) -> Result<CopyStatus>;

    /// Gives up on a copy that will not be polled again. The target is left as it was.
    async fn abort_copy(&self, _handle: &CopyHandle) -> Result<()> {
        Ok(())
    }

    /// Whether the directory node `key` exists. Only meaningful for
    /// [`DirectoryModel::Native`] backends.
    async fn directory_exists(&self, key: &str) -> Result<bool> {
        Err(StoreError::Unsupported(format!(
            "directory nodes are inferred, cannot query {key}"
        )))
    }

    /// Removes the (already emptied) directory node `key`. Absent nodes are not an error.
    async fn delete_directory_node(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}
