use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::core::{ByteReader, CancellationToken, Result, StoreError, cancelled_io};

/// Readable file content returned by [`FileStore::get_file_stream`](crate::FileStore::get_file_stream).
///
/// Every read checks the cancellation token first. A cancelled read fails with an
/// I/O error that converts back into [`StoreError::Cancelled`].
pub struct FileStream<R = ByteReader> {
    inner: R,
    cancel: CancellationToken,
}

impl<R: AsyncRead + Unpin> FileStream<R> {
    pub fn new(inner: R, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    /// Reads everything that is left.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        AsyncReadExt::read_to_end(self, &mut buf)
            .await
            .map_err(StoreError::from)?;
        Ok(buf)
    }

    /// Reads everything that is left as UTF-8 text.
    pub async fn read_to_string(&mut self) -> Result<String> {
        let bytes = self.read_to_end().await?;
        String::from_utf8(bytes).map_err(|err| StoreError::Provider(err.into()))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for FileStream<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(Err(cancelled_io()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
