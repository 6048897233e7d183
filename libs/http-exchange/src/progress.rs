//! Upload and download progress reporting.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use http::HeaderMap;
use http::header::CONTENT_LENGTH;

/// Progress observer: `(bytes_transferred, bytes_total)`.
///
/// `bytes_total` is `None` when the size of the transfer is not known up
/// front (no numeric `Content-Length`).
pub type ProgressListener = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Running byte counter feeding an optional listener
pub(crate) struct Progress {
    listener: Option<ProgressListener>,
    total: Option<u64>,
    transferred: u64,
}

impl Progress {
    pub(crate) fn new(listener: Option<ProgressListener>, total: Option<u64>) -> Self {
        Self {
            listener,
            total,
            transferred: 0,
        }
    }

    /// Initial `(0, total)` notification, sent before the first chunk
    pub(crate) fn start(&self) {
        self.notify();
    }

    pub(crate) fn advance(&mut self, len: usize) {
        self.transferred += len as u64;
        self.notify();
    }

    pub(crate) fn transferred(&self) -> u64 {
        self.transferred
    }

    fn notify(&self) {
        if let Some(listener) = &self.listener {
            listener(self.transferred, self.total);
        }
    }
}

/// Wrap a chunk stream so that every successfully produced chunk advances `progress`.
///
/// The initial `(0, total)` notification is sent on the first poll, so a
/// transfer that never starts (for example a failed connect) reports nothing.
pub(crate) fn observe<S, E>(chunks: S, progress: Progress) -> impl Stream<Item = Result<Bytes, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    stream::unfold(
        (Box::pin(chunks), progress, false),
        |(mut chunks, mut progress, started)| async move {
            if !started {
                progress.start();
            }
            let chunk = chunks.next().await?;
            if let Ok(bytes) = &chunk {
                progress.advance(bytes.len());
            }
            Some((chunk, (chunks, progress, true)))
        },
    )
}

/// `Content-Length` when it is a plain decimal number, `None` otherwise.
///
/// Anything else (missing, signed, padded, non-numeric) counts as unknown.
pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(CONTENT_LENGTH)?.to_str().ok()?;
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
