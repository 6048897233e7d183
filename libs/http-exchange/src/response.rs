use bytes::{Buf, Bytes};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::io::{self, Read, Write};
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tracing::trace;

use crate::error::ClientError;
use crate::progress::{self, Progress, ProgressListener};

/// Status code reported by a [`Response`] that carries a transport failure
pub const FAILED_STATUS_CODE: i32 = -1;

const BUFFER_SIZE: usize = 8192;
const MAX_PREALLOCATION: usize = 1 << 20;

/// The open network exchange behind a response body.
///
/// Dropping it releases the connection, so owning it in exactly one place is
/// what guarantees a single release.
struct Connection(reqwest::Response);

impl Connection {
    async fn chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        self.0.chunk().await.map_err(ClientError::from_transport)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        trace!(url = %self.0.url(), "connection released");
    }
}

/// Result of one HTTP exchange.
///
/// Status and headers are always available. The body stays on the network
/// connection until one of the accessors reads it:
///
/// - draining accessors ([`bytes`](Self::bytes), [`text`](Self::text),
///   [`json`](Self::json), [`write_to`](Self::write_to),
///   [`write_to_file`](Self::write_to_file) and their `_blocking` twins) read
///   the whole body, report download progress, and release the connection
///   whether they succeed or fail;
/// - [`chunk`](Self::chunk) and [`reader`](Self::reader) hand out the live
///   body and leave the connection open until [`close`](Self::close) or drop.
///
/// Error statuses are not failures: their body is read the same way.
pub struct Response {
    code: i32,
    status: Option<StatusCode>,
    message: String,
    headers: HeaderMap,
    connection: Option<Connection>,
    runtime: Option<Handle>,
    download_progress: Option<ProgressListener>,
    failure: Option<ClientError>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("headers", &self.headers)
            .field("open", &self.connection.is_some())
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

impl Response {
    pub(crate) fn from_wire(resp: reqwest::Response, download_progress: Option<ProgressListener>) -> Self {
        let status = resp.status();
        Self {
            code: i32::from(status.as_u16()),
            status: Some(status),
            message: reason_phrase(&resp),
            headers: resp.headers().clone(),
            connection: Some(Connection(resp)),
            runtime: Handle::try_current().ok(),
            download_progress,
            failure: None,
        }
    }

    /// Sentinel response for an exchange that never produced a status line
    pub(crate) fn failed(err: ClientError) -> Self {
        Self {
            code: FAILED_STATUS_CODE,
            status: None,
            message: err.to_string(),
            headers: HeaderMap::new(),
            connection: None,
            runtime: None,
            download_progress: None,
            failure: Some(err),
        }
    }

    /// Numeric status code, or [`FAILED_STATUS_CODE`] when the exchange failed
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Get the HTTP status code; `None` when the exchange failed
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Status reason phrase, or the failure description when the exchange failed
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The error that turned this into a failed response, if any
    #[must_use]
    pub fn failure(&self) -> Option<&ClientError> {
        self.failure.as_ref()
    }

    /// Get the response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of header `name`, matched case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of header `name` in the order received, matched case-insensitively
    #[must_use]
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// `Content-Length` when the server sent a plain number
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        progress::content_length(&self.headers)
    }

    /// Whether the connection has been released
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    /// Release the connection; calling it again is a no-op
    pub fn close(&mut self) {
        drop(self.connection.take());
    }

    fn take_connection(&mut self) -> Result<Connection, ClientError> {
        self.connection.take().ok_or_else(body_unavailable)
    }

    fn runtime(&self) -> Result<Handle, ClientError> {
        self.runtime
            .clone()
            .ok_or_else(|| ClientError::state("response is not bound to a runtime"))
    }

    fn download_tracker(&self) -> Progress {
        Progress::new(self.download_progress.clone(), self.content_length())
    }

    fn buffer(&self) -> Vec<u8> {
        let capacity = self
            .content_length()
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(BUFFER_SIZE)
            .min(MAX_PREALLOCATION);
        Vec::with_capacity(capacity)
    }

    /// Next chunk of the live body, `None` at its end.
    ///
    /// Does not close the connection.
    ///
    /// # Errors
    /// [`ClientError::State`] once the connection was released; transport
    /// errors while reading.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        self.connection
            .as_mut()
            .ok_or_else(body_unavailable)?
            .chunk()
            .await
    }

    /// Consume the body and return it as bytes
    ///
    /// # Errors
    /// [`ClientError::State`] if the connection was already released;
    /// transport errors while reading.
    pub async fn bytes(&mut self) -> Result<Bytes, ClientError> {
        let mut buf = self.buffer();
        self.write_to(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Consume the body and decode it as UTF-8
    ///
    /// # Errors
    /// As [`bytes`](Self::bytes), plus [`ClientError::Parse`] for invalid UTF-8.
    pub async fn text(&mut self) -> Result<String, ClientError> {
        let bytes = self.bytes().await?;
        decode_utf8(&bytes)
    }

    /// Consume the body and deserialize it as JSON
    ///
    /// # Errors
    /// As [`bytes`](Self::bytes), plus [`ClientError::Parse`] on malformed JSON.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, ClientError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Copy the body into `sink`, returning the number of bytes written
    ///
    /// # Errors
    /// [`ClientError::State`] if the connection was already released;
    /// transport or sink I/O errors.
    pub async fn write_to<W>(&mut self, sink: &mut W) -> Result<u64, ClientError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut connection = self.take_connection()?;
        let mut progress = self.download_tracker();
        progress.start();
        while let Some(chunk) = connection.chunk().await? {
            sink.write_all(&chunk).await?;
            progress.advance(chunk.len());
        }
        sink.flush().await?;
        Ok(progress.transferred())
    }

    /// Write the body to a file created (or truncated) at `path`
    ///
    /// # Errors
    /// As [`write_to`](Self::write_to), plus I/O errors creating the file.
    pub async fn write_to_file(&mut self, path: impl AsRef<Path>) -> Result<u64, ClientError> {
        let mut file = match tokio::fs::File::create(path.as_ref()).await {
            Ok(file) => file,
            Err(e) => {
                self.close();
                return Err(e.into());
            }
        };
        self.write_to(&mut file).await
    }

    /// Blocking version of [`bytes`](Self::bytes)
    ///
    /// # Errors
    /// As [`bytes`](Self::bytes).
    ///
    /// # Panics
    /// When called from inside an asynchronous execution context.
    pub fn bytes_blocking(&mut self) -> Result<Bytes, ClientError> {
        let mut buf = self.buffer();
        self.write_to_blocking(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Blocking version of [`text`](Self::text)
    ///
    /// # Errors
    /// As [`text`](Self::text).
    ///
    /// # Panics
    /// When called from inside an asynchronous execution context.
    pub fn text_blocking(&mut self) -> Result<String, ClientError> {
        let bytes = self.bytes_blocking()?;
        decode_utf8(&bytes)
    }

    /// Blocking version of [`json`](Self::json)
    ///
    /// # Errors
    /// As [`json`](Self::json).
    ///
    /// # Panics
    /// When called from inside an asynchronous execution context.
    pub fn json_blocking<T: DeserializeOwned>(&mut self) -> Result<T, ClientError> {
        let bytes = self.bytes_blocking()?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Blocking version of [`write_to`](Self::write_to)
    ///
    /// # Errors
    /// As [`write_to`](Self::write_to).
    ///
    /// # Panics
    /// When called from inside an asynchronous execution context.
    pub fn write_to_blocking<W>(&mut self, sink: &mut W) -> Result<u64, ClientError>
    where
        W: Write + ?Sized,
    {
        let mut connection = self.take_connection()?;
        let runtime = self.runtime()?;
        let mut progress = self.download_tracker();
        progress.start();
        while let Some(chunk) = runtime.block_on(connection.chunk())? {
            sink.write_all(&chunk)?;
            progress.advance(chunk.len());
        }
        sink.flush()?;
        Ok(progress.transferred())
    }

    /// Blocking version of [`write_to_file`](Self::write_to_file)
    ///
    /// # Errors
    /// As [`write_to_file`](Self::write_to_file).
    ///
    /// # Panics
    /// When called from inside an asynchronous execution context.
    pub fn write_to_file_blocking(&mut self, path: impl AsRef<Path>) -> Result<u64, ClientError> {
        let mut file = match std::fs::File::create(path.as_ref()) {
            Ok(file) => file,
            Err(e) => {
                self.close();
                return Err(e.into());
            }
        };
        self.write_to_blocking(&mut file)
    }

    /// Live body as a blocking [`Read`].
    ///
    /// The connection stays open after the reader is dropped; call
    /// [`close`](Self::close) when done. No download progress is reported.
    ///
    /// # Errors
    /// [`ClientError::State`] if the connection was already released.
    pub fn reader(&mut self) -> Result<BodyReader<'_>, ClientError> {
        let connection = self.connection.as_mut().ok_or_else(body_unavailable)?;
        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| ClientError::state("response is not bound to a runtime"))?;
        Ok(BodyReader {
            connection,
            runtime,
            pending: Bytes::new(),
        })
    }
}

/// Blocking reader over a live response body, see [`Response::reader`]
pub struct BodyReader<'a> {
    connection: &'a mut Connection,
    runtime: Handle,
    pending: Bytes,
}

impl std::fmt::Debug for BodyReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyReader")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Read for BodyReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.runtime.block_on(self.connection.chunk()) {
                Ok(Some(chunk)) => self.pending = chunk,
                Ok(None) => return Ok(0),
                Err(e) => return Err(io::Error::other(e)),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

/// Reason phrase as sent by the server.
///
/// hyper only records the phrase when it differs from the canonical one, so
/// the canonical reason fills in otherwise (empty for unregistered codes).
fn reason_phrase(resp: &reqwest::Response) -> String {
    match resp.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => resp
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_owned(),
    }
}

fn body_unavailable() -> ClientError {
    ClientError::state(
        "response body is not available: the exchange failed or the connection was already closed",
    )
}

fn decode_utf8(bytes: &Bytes) -> Result<String, ClientError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ClientError::Parse(format!("Invalid UTF-8: {e}")))
}
