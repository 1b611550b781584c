//! Lazy enumeration over token-paginated listings.
//!
//! A [`Lister`] hands out one [`PagedEnumerator`] per listing request. The enumerator
//! walks the backend's pages in order and presents them as a single forward-only
//! sequence. It cannot be restarted: ask the `Lister` again for a fresh one.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::Stream;
use futures_util::stream;
use tracing::trace;

use crate::core::{CancellationToken, Cursor, FileHandle, PageSource, Result, utils};

/// Factory for listing enumerators over one page source.
#[derive(Clone)]
pub struct Lister {
    source: Arc<dyn PageSource>,
}

impl Lister {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self { source }
    }

    /// Starts a new listing of the directory `prefix`. Nothing is fetched until the
    /// first item is requested.
    pub fn enumerate(&self, prefix: impl Into<String>, cancel: CancellationToken) -> PagedEnumerator {
        PagedEnumerator {
            source: Arc::clone(&self.source),
            prefix: prefix.into(),
            cancel,
            state: State::NotStarted,
            pages_fetched: 0,
        }
    }
}

enum State {
    NotStarted,
    InPage {
        items: VecDeque<FileHandle>,
        next: Option<Cursor>,
    },
    Exhausted,
}

/// Single-use, forward-only sequence of [`FileHandle`]s.
///
/// The listing ends only after a page arrives without a continuation cursor and all of
/// its items were handed out. Empty pages that still carry a cursor are skipped.
/// Cancellation is observed before every page fetch; items already returned stay valid.
pub struct PagedEnumerator {
    source: Arc<dyn PageSource>,
    prefix: String,
    cancel: CancellationToken,
    state: State,
    pages_fetched: usize,
}

impl PagedEnumerator {
    /// Returns the next entry, fetching further pages as needed.
    /// `Ok(None)` means the listing is exhausted; later calls issue no fetches.
    pub async fn next(&mut self) -> Result<Option<FileHandle>> {
        self.fill().await?;
        match &mut self.state {
            State::InPage { items, .. } => Ok(items.pop_front()),
            _ => Ok(None),
        }
    }

    /// Returns the next entry without consuming it.
    pub async fn peek(&mut self) -> Result<Option<&FileHandle>> {
        self.fill().await?;
        match &self.state {
            State::InPage { items, .. } => Ok(items.front()),
            _ => Ok(None),
        }
    }

    /// Number of page fetches issued so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    /// Drains the remaining entries into a vector.
    pub async fn collect(mut self) -> Result<Vec<FileHandle>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Adapts the enumerator into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<FileHandle>> + Send {
        stream::try_unfold(self, |mut enumerator| async move {
            Ok(enumerator.next().await?.map(|entry| (entry, enumerator)))
        })
    }

    /// Fetches until at least one item is buffered or the listing is exhausted.
    async fn fill(&mut self) -> Result<()> {
        loop {
            let cursor = match std::mem::replace(&mut self.state, State::Exhausted) {
                State::NotStarted => None,
                State::InPage { items, next } if !items.is_empty() => {
                    self.state = State::InPage { items, next };
                    return Ok(());
                }
                State::InPage {
                    next: Some(cursor), ..
                } => Some(cursor),
                State::InPage { next: None, .. } | State::Exhausted => return Ok(()),
            };

            if let Err(err) = self.cancel.check() {
                self.restore(cursor);
                return Err(err);
            }

            let page = match self.source.list_page(&self.prefix, cursor.as_ref()).await {
                Ok(page) => page,
                Err(err) => {
                    self.restore(cursor);
                    return Err(err);
                }
            };
            self.pages_fetched += 1;
            trace!(
                prefix = %self.prefix,
                page = self.pages_fetched,
                items = page.items.len(),
                more = page.next.is_some(),
                "fetched listing page"
            );

            self.state = State::InPage {
                items: page.items.into(),
                next: page.next,
            };
        }
    }

    /// Puts the enumerator back where it was before a failed fetch.
    fn restore(&mut self, cursor: Option<Cursor>) {
        self.state = match cursor {
            None => State::NotStarted,
            Some(cursor) => State::InPage {
                items: VecDeque::new(),
                next: Some(cursor),
            },
        };
    }
}

/// Result of listing a directory through the store.
///
/// A missing directory is reported with `exists() == false` and no entries rather
/// than as an error.
pub struct DirectoryListing {
    exists: bool,
    name: String,
    path: Option<String>,
    entries: Option<PagedEnumerator>,
}

impl DirectoryListing {
    pub(crate) fn found(key: &str, entries: PagedEnumerator) -> Self {
        Self {
            exists: true,
            name: utils::file_name(key).to_string(),
            path: Some(key.to_string()),
            entries: Some(entries),
        }
    }

    pub(crate) fn not_found(requested: &str) -> Self {
        Self {
            exists: false,
            name: requested.to_string(),
            path: None,
            entries: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Directory name, or the requested path when the directory does not exist.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root-relative key of the directory (`""` for the store root).
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub async fn next(&mut self) -> Result<Option<FileHandle>> {
        match self.entries.as_mut() {
            Some(entries) => entries.next().await,
            None => Ok(None),
        }
    }

    pub async fn collect(self) -> Result<Vec<FileHandle>> {
        match self.entries {
            Some(entries) => entries.collect().await,
            None => Ok(Vec::new()),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<FileHandle>> + Send {
        stream::try_unfold(self, |mut listing| async move {
            Ok(listing.next().await?.map(|entry| (entry, listing)))
        })
    }
}
