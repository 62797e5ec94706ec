//! Streaming and progress plumbing for splitdl
//!
//! Provides the AsyncRead adapter over HTTP bodies and the per-job progress
//! handle shared by all part workers.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::TryStreamExt;
use tokio::io::{AsyncRead, ReadBuf};

/// Buffer size for copying response bodies into part files
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A response body exposed as an AsyncRead
pub struct DownloadStream {
    inner: Box<dyn AsyncRead + Send + Unpin>,
}

impl AsyncRead for DownloadStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Creates a DownloadStream from an HTTP response
pub fn create_http_stream(response: reqwest::Response) -> DownloadStream {
    let inner = Box::new(tokio_util::io::StreamReader::new(
        response.bytes_stream().map_err(std::io::Error::other),
    ));
    DownloadStream { inner }
}

/// Progress callback receiving `(downloaded, total)`; `total` is 0 when unknown
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Byte counter for one job, shared by every worker.
///
/// Purely observational: nothing in the transfer reads it back.
#[derive(Clone)]
pub struct Progress {
    inner: Arc<ProgressInner>,
}

struct ProgressInner {
    downloaded: AtomicU64,
    total: AtomicU64,
    finished: AtomicBool,
    callback: Option<ProgressCallback>,
}

impl Progress {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                downloaded: AtomicU64::new(0),
                total: AtomicU64::new(0),
                finished: AtomicBool::new(false),
                callback,
            }),
        }
    }

    /// Progress handle that reports nowhere
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Record the expected total once the plan is known
    pub fn set_total(&self, total: u64) {
        self.inner.total.store(total, Ordering::Relaxed);
        self.notify(self.downloaded());
    }

    /// Add `delta` written bytes and notify the sink
    pub fn advance(&self, delta: u64) {
        let current = self.inner.downloaded.fetch_add(delta, Ordering::Relaxed) + delta;
        self.notify(current);
    }

    pub fn downloaded(&self) -> u64 {
        self.inner.downloaded.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.inner.total.load(Ordering::Relaxed)
    }

    /// Signal completion; the sink sees `downloaded == total` exactly once
    pub fn finish(&self) {
        if self.inner.finished.swap(true, Ordering::Relaxed) {
            return;
        }
        let total = match self.total() {
            0 => self.downloaded(),
            total => total,
        };
        if let Some(callback) = &self.inner.callback {
            callback(total, total);
        }
    }

    /// Bytes from abandoned attempts stay counted, so the sink never sees
    /// more than `total`; only `finish` marks completion.
    fn notify(&self, current: u64) {
        if let Some(callback) = &self.inner.callback {
            let total = self.total();
            let reported = if total > 0 { current.min(total) } else { current };
            callback(reported, total);
        }
    }
}
