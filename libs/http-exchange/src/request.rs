use bytes::Bytes;
use futures::stream::{self, Stream};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::body::Body;
use crate::encoding::{Params, append_query};
use crate::error::ClientError;
use crate::progress::{self, Progress, ProgressListener};
use crate::response::Response;
use crate::tls::TrustedRoot;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const OCTET_STREAM: &str = "application/octet-stream";
const UPLOAD_CHUNK: usize = 8192;

/// One HTTP exchange, configured through a consuming builder and executed
/// exactly once by [`Request::send`].
///
/// ```compile_fail
/// # use http_exchange::Request;
/// # async fn twice() {
/// let request = Request::get("http://localhost/");
/// let _ = request.send().await;
/// let _ = request.send().await; // `request` was moved by the first send
/// # }
/// ```
pub struct Request {
    method: Method,
    url: String,
    headers: HeaderMap,
    params: Params,
    body: Body,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    proxy: Option<(String, u16)>,
    trusted_root: Option<TrustedRoot>,
    upload_progress: Option<ProgressListener>,
    download_progress: Option<ProgressListener>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("proxy", &self.proxy)
            .field("trusted_root", &self.trusted_root)
            .field("upload_progress", &self.upload_progress.is_some())
            .field("download_progress", &self.download_progress.is_some())
            .finish()
    }
}

impl Request {
    /// Create a request for `url` using `method`.
    ///
    /// Parameters belong in [`Request::param`], not in `url`; the URL itself
    /// is validated when the request is sent.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            params: Params::default(),
            body: Body::Empty,
            connect_timeout: None,
            read_timeout: None,
            proxy: None,
            trusted_root: None,
            upload_progress: None,
            download_progress: None,
        }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Get the HTTP method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the target URL as given at construction
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the request body
    #[must_use]
    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Add a header; an existing header with the same name is overwritten
    ///
    /// # Errors
    /// Returns [`ClientError::Configuration`] for an invalid name or value.
    pub fn header<K, V>(mut self, key: K, value: V) -> Result<Self, ClientError>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
        K::Error: std::fmt::Display,
        V::Error: std::fmt::Display,
    {
        let key = key
            .try_into()
            .map_err(|e| ClientError::config(format!("Invalid header name: {e}")))?;
        let value = value
            .try_into()
            .map_err(|e| ClientError::config(format!("Invalid header value: {e}")))?;
        self.headers.insert(key, value);
        Ok(self)
    }

    /// Add a query or form parameter; the value is URL-encoded on send.
    ///
    /// Query-style methods (GET, HEAD, OPTIONS, TRACE, DELETE) append the
    /// parameters to the URL. Other methods send them as an
    /// `application/x-www-form-urlencoded` body unless an explicit body is set.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.set(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Route the request through an HTTP forward proxy.
    ///
    /// An empty host or port 0 leaves the request unproxied.
    #[must_use]
    pub fn proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy = Some((host.into(), port));
        self
    }

    /// Set the request body, replacing any previously set body
    #[must_use]
    pub fn body<B: Into<Body>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Stream the request body from `reader`, replacing any previously set body
    #[must_use]
    pub fn body_reader<R>(self, reader: R) -> Self
    where
        R: tokio::io::AsyncRead + Send + 'static,
    {
        self.body(Body::from_reader(reader))
    }

    /// Stream the request body from a file.
    ///
    /// The file is opened now. Unless a `Content-Length` header was already
    /// added, it is set to the file size.
    ///
    /// # Errors
    /// Returns [`ClientError::Configuration`] if `path` is missing, is not a
    /// regular file, or cannot be opened.
    pub fn body_file(mut self, path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| ClientError::config(format!("invalid body file {}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(ClientError::config(format!(
                "invalid body file {}: not a regular file",
                path.display()
            )));
        }
        let file = std::fs::File::open(path)
            .map_err(|e| ClientError::config(format!("invalid body file {}: {e}", path.display())))?;
        if !self.headers.contains_key(CONTENT_LENGTH) {
            self.headers
                .insert(CONTENT_LENGTH, HeaderValue::from(metadata.len()));
        }
        Ok(self.body_reader(tokio::fs::File::from_std(file)))
    }

    /// Pin `root` as the only trusted certificate for this request
    #[must_use]
    pub fn trusted_root(mut self, root: TrustedRoot) -> Self {
        self.trusted_root = Some(root);
        self
    }

    /// Observe upload progress; a later call replaces the earlier listener
    #[must_use]
    pub fn on_upload_progress<F>(mut self, listener: F) -> Self
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        self.upload_progress = Some(Arc::new(listener));
        self
    }

    /// Observe download progress while a body-draining accessor of the
    /// [`Response`] runs; a later call replaces the earlier listener
    #[must_use]
    pub fn on_download_progress<F>(mut self, listener: F) -> Self
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        self.download_progress = Some(Arc::new(listener));
        self
    }

    /// Perform the round trip.
    ///
    /// Redirects are not followed: a 3xx comes back as an ordinary response
    /// with its `Location` header. Status and headers are read eagerly, the
    /// body stays on the connection until a [`Response`] accessor reads it.
    ///
    /// # Errors
    /// - [`ClientError::Configuration`] for an invalid URL, a trusted root on
    ///   a non-`https` target, or an unusable proxy; raised before any I/O.
    /// - [`ClientError::Connection`], [`ClientError::Timeout`] or
    ///   [`ClientError::Transport`] when the exchange fails on the wire.
    pub async fn send(self) -> Result<Response, ClientError> {
        let Request {
            method,
            url,
            mut headers,
            params,
            body,
            connect_timeout,
            read_timeout,
            proxy,
            trusted_root,
            upload_progress,
            download_progress,
        } = self;

        let mut target =
            Url::parse(&url).map_err(|e| ClientError::config(format!("invalid URL '{url}': {e}")))?;
        if trusted_root.is_some() && target.scheme() != "https" {
            return Err(ClientError::config(format!(
                "trusted root was set but '{url}' does not use https"
            )));
        }

        let encoded = params.encode();
        let has_body = carries_body(&method);
        if !has_body {
            if let Some(query) = &encoded {
                append_query(&mut target, query);
            }
        }

        let client = build_client(
            connect_timeout,
            read_timeout,
            proxy.as_ref(),
            trusted_root.as_ref(),
        )?;

        let payload = if has_body {
            Some(prepare_payload(body, encoded, &mut headers, upload_progress))
        } else {
            if !body.is_empty() {
                debug!(%method, "dropping explicit body on a query-style method");
            }
            None
        };

        debug!(%method, url = %target, "sending request");
        let mut req_builder = client.request(method, target).headers(headers);
        if let Some(payload) = payload {
            req_builder = req_builder.body(payload);
        }

        let resp = req_builder
            .send()
            .await
            .map_err(ClientError::from_transport)?;
        debug!(status = %resp.status(), url = %resp.url(), "response headers received");

        Ok(Response::from_wire(resp, download_progress))
    }
}

/// Whether parameters travel in the body rather than the query string
fn carries_body(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::DELETE
    )
}

fn build_client(
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    proxy: Option<&(String, u16)>,
    trusted_root: Option<&TrustedRoot>,
) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0);

    if let Some(timeout) = connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = read_timeout {
        builder = builder.read_timeout(timeout);
    }
    if let Some((host, port)) = proxy.filter(|(host, port)| !host.is_empty() && *port != 0) {
        let proxy = reqwest::Proxy::all(format!("http://{host}:{port}"))
            .map_err(|e| ClientError::config(format!("invalid proxy {host}:{port}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    if let Some(root) = trusted_root {
        builder = builder
            .tls_built_in_root_certs(false)
            .add_root_certificate(root.to_reqwest()?);
    }

    builder
        .build()
        .map_err(|e| ClientError::config(format!("cannot build HTTP client: {e}")))
}

/// Pick the body to write for a body-carrying method and fill in the
/// default `Content-Type` / `Content-Length` headers the caller left unset.
fn prepare_payload(
    body: Body,
    encoded_params: Option<String>,
    headers: &mut HeaderMap,
    upload_progress: Option<ProgressListener>,
) -> reqwest::Body {
    let (bytes, default_type) = match body {
        Body::Stream(stream) => {
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(OCTET_STREAM));
            let total = progress::content_length(headers);
            let observed = progress::observe(stream, Progress::new(upload_progress, total));
            return reqwest::Body::wrap_stream(observed);
        }
        Body::Bytes(bytes) => (bytes, OCTET_STREAM),
        Body::Empty => (
            encoded_params.map(Bytes::from).unwrap_or_default(),
            FORM_URLENCODED,
        ),
    };

    headers
        .entry(CONTENT_TYPE)
        .or_insert(HeaderValue::from_static(default_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));

    match upload_progress {
        None => reqwest::Body::from(bytes),
        Some(listener) => {
            let total = Some(bytes.len() as u64);
            reqwest::Body::wrap_stream(progress::observe(
                chunked(bytes),
                Progress::new(Some(listener), total),
            ))
        }
    }
}

/// Split a buffer into upload-sized chunks so progress is reported per chunk
fn chunked(bytes: Bytes) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let len = bytes.len();
    stream::iter(
        (0..len)
            .step_by(UPLOAD_CHUNK)
            .map(move |start| Ok(bytes.slice(start..(start + UPLOAD_CHUNK).min(len)))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_request_defaults() {
        let request = Request::get("http://localhost/a");
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.url(), "http://localhost/a");
        assert!(request.headers().is_empty());
        assert!(request.body_ref().is_empty());
    }

    #[test]
    fn test_header_overwrites_same_name() {
        let request = Request::get("http://localhost/")
            .header("X-Token", "one")
            .unwrap()
            .header("x-token", "two")
            .unwrap();
        let values: Vec<_> = request.headers().get_all("x-token").iter().collect();
        assert_eq!(values, vec!["two"]);
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let err = Request::get("http://localhost/")
            .header("bad header", "v")
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_body_replaces_previous_body() {
        let request = Request::post("http://localhost/")
            .body_reader(&b"stream"[..])
            .body("bytes");
        assert!(matches!(request.body_ref(), Body::Bytes(b) if &b[..] == b"bytes"));
    }

    #[test]
    fn test_carries_body() {
        assert!(!carries_body(&Method::GET));
        assert!(!carries_body(&Method::DELETE));
        assert!(!carries_body(&Method::HEAD));
        assert!(carries_body(&Method::POST));
        assert!(carries_body(&Method::PUT));
        assert!(carries_body(&Method::PATCH));
        assert!(carries_body(&Method::from_bytes(b"PURGE").unwrap()));
    }

    #[test]
    fn test_params_become_form_body() {
        let mut params = Params::default();
        params.set("p".into(), "v".into());
        let mut headers = HeaderMap::new();
        let body = prepare_payload(Body::Empty, params.encode(), &mut headers, None);
        assert_eq!(body.as_bytes(), Some(&b"p=v"[..]));
        assert_eq!(headers[CONTENT_TYPE], FORM_URLENCODED);
        assert_eq!(headers[CONTENT_LENGTH], "3");
    }

    #[test]
    fn test_explicit_body_wins_over_params_and_keeps_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = prepare_payload(
            Body::from("{}"),
            Some("ignored=1".to_owned()),
            &mut headers,
            None,
        );
        assert_eq!(body.as_bytes(), Some(&b"{}"[..]));
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[CONTENT_LENGTH], "2");
    }

    #[test]
    fn test_bytes_default_to_octet_stream() {
        let mut headers = HeaderMap::new();
        prepare_payload(Body::from(vec![1u8, 2]), None, &mut headers, None);
        assert_eq!(headers[CONTENT_TYPE], OCTET_STREAM);
    }

    #[test]
    fn test_no_body_no_params_sends_empty_form() {
        let mut headers = HeaderMap::new();
        let body = prepare_payload(Body::Empty, None, &mut headers, None);
        assert_eq!(body.as_bytes(), Some(&b""[..]));
        assert_eq!(headers[CONTENT_LENGTH], "0");
    }

    #[tokio::test]
    async fn test_chunked_splits_on_upload_chunk() {
        let data = Bytes::from(vec![7u8; UPLOAD_CHUNK * 2 + 5]);
        let sizes: Vec<usize> = chunked(data)
            .map(|chunk| chunk.unwrap().len())
            .collect()
            .await;
        assert_eq!(sizes, vec![UPLOAD_CHUNK, UPLOAD_CHUNK, 5]);
    }

    #[tokio::test]
    async fn test_pinned_root_on_plain_http_fails_before_io() {
        let pem = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()])
            .unwrap()
            .cert
            .pem();
        let root = TrustedRoot::from_pem(pem.as_bytes()).unwrap();
        // port 9 (discard) would fail to connect; the error must be configuration, not I/O
        let err = Request::get("http://127.0.0.1:9/")
            .trusted_root(root)
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let err = Request::get("not a url").send().await.unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }
}
