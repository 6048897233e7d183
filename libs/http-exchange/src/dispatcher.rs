use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::request::Request;
use crate::response::Response;

/// Configuration for a [`Dispatcher`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Async worker threads; `None` uses one per CPU core
    pub worker_threads: Option<usize>,
    /// Upper bound of the pool running callback-style exchanges
    pub max_blocking_threads: usize,
    pub thread_name: String,
    /// How long [`Dispatcher::shutdown`] waits for in-flight work
    pub shutdown_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            max_blocking_threads: 512,
            thread_name: "http-exchange-worker".to_owned(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl DispatcherConfig {
    /// Create configuration from environment variables
    ///
    /// Reads, each optional:
    /// - `HTTP_EXCHANGE_WORKER_THREADS`
    /// - `HTTP_EXCHANGE_MAX_BLOCKING_THREADS`
    /// - `HTTP_EXCHANGE_THREAD_NAME`
    /// - `HTTP_EXCHANGE_SHUTDOWN_TIMEOUT_MS`
    ///
    /// # Errors
    /// [`ClientError::Configuration`] when a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(threads) = env_number("HTTP_EXCHANGE_WORKER_THREADS")? {
            config.worker_threads = Some(threads);
        }
        if let Some(threads) = env_number("HTTP_EXCHANGE_MAX_BLOCKING_THREADS")? {
            config.max_blocking_threads = threads;
        }
        if let Ok(name) = std::env::var("HTTP_EXCHANGE_THREAD_NAME") {
            config.thread_name = name;
        }
        if let Some(ms) = env_number("HTTP_EXCHANGE_SHUTDOWN_TIMEOUT_MS")? {
            config.shutdown_timeout_ms = ms;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    #[must_use]
    pub fn with_max_blocking_threads(mut self, threads: usize) -> Self {
        self.max_blocking_threads = threads;
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ClientError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ClientError::config(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Task-execution context for HTTP exchanges.
///
/// Owns the runtime that drives connections, so it must outlive every
/// [`Response`] whose body is still to be read. Create one at application
/// start and pass it where exchanges are made; several dispatchers may
/// coexist.
///
/// Dropping a dispatcher blocks until running callbacks return and must not
/// happen inside an asynchronous execution context.
pub struct Dispatcher {
    runtime: Runtime,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a dispatcher and its worker pool
    ///
    /// # Errors
    /// [`ClientError::Configuration`] for zero-sized pools,
    /// [`ClientError::Io`] when the threads cannot be started.
    pub fn new(config: DispatcherConfig) -> Result<Self, ClientError> {
        if config.worker_threads == Some(0) {
            return Err(ClientError::config("worker_threads must be at least 1"));
        }
        if config.max_blocking_threads == 0 {
            return Err(ClientError::config("max_blocking_threads must be at least 1"));
        }

        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder
            .enable_all()
            .thread_name(config.thread_name.clone())
            .max_blocking_threads(config.max_blocking_threads);
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads);
        }
        let runtime = builder.build()?;

        debug!(
            worker_threads = ?config.worker_threads,
            max_blocking_threads = config.max_blocking_threads,
            "dispatcher started"
        );
        Ok(Self {
            runtime,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Handle to the dispatcher's runtime
    #[must_use]
    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// Send `request` and block the calling thread until the status line and
    /// headers have arrived.
    ///
    /// # Errors
    /// Whatever [`Request::send`] returns.
    ///
    /// # Panics
    /// When called from inside an asynchronous execution context.
    pub fn send(&self, request: Request) -> Result<Response, ClientError> {
        self.runtime.block_on(request.send())
    }

    /// Start `request` in the background and return a handle to its result
    #[must_use = "dropping the handle detaches the exchange and loses its response"]
    pub fn submit(&self, request: Request) -> PendingResponse {
        PendingResponse {
            task: self.runtime.spawn(request.send()),
            handle: self.runtime.handle().clone(),
        }
    }

    /// Start `request` in the background and hand the outcome to `callback`.
    ///
    /// The callback runs exactly once, on a dispatcher pool thread, never on
    /// the caller's thread. A failed exchange is delivered as a [`Response`]
    /// whose [`code`](Response::code) is -1 and whose
    /// [`message`](Response::message) describes the failure. The blocking
    /// body accessors of the response may be used inside the callback.
    pub fn submit_with<F>(&self, request: Request, callback: F)
    where
        F: FnOnce(Response) + Send + 'static,
    {
        let handle = self.runtime.handle().clone();
        self.runtime.spawn_blocking(move || {
            let response = handle.block_on(request.send()).unwrap_or_else(|err| {
                warn!(error = %err, "exchange failed, reporting sentinel status");
                Response::failed(err)
            });
            callback(response);
        });
    }

    /// Stop the worker pool, waiting up to the configured shutdown timeout
    /// for in-flight exchanges and callbacks.
    pub fn shutdown(self) {
        debug!(timeout = ?self.shutdown_timeout, "dispatcher shutting down");
        self.runtime.shutdown_timeout(self.shutdown_timeout);
    }
}

/// Handle to an exchange started with [`Dispatcher::submit`].
///
/// Await it from async code, or [`wait`](Self::wait) for it from a plain
/// thread. [`abort`](Self::abort) cancels the exchange.
#[derive(Debug)]
pub struct PendingResponse {
    task: JoinHandle<Result<Response, ClientError>>,
    handle: Handle,
}

impl PendingResponse {
    /// Block until the exchange completes
    ///
    /// # Errors
    /// The exchange's own error, or [`ClientError::State`] if it was aborted.
    ///
    /// # Panics
    /// When called from inside an asynchronous execution context.
    pub fn wait(self) -> Result<Response, ClientError> {
        let handle = self.handle.clone();
        handle.block_on(self)
    }

    /// Cancel the exchange; awaiting the handle afterwards yields a state error
    pub fn abort(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for PendingResponse {
    type Output = Result<Response, ClientError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().task)
            .poll(cx)
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => {
                    Err(ClientError::state("exchange was aborted before completion"))
                }
                Err(e) => Err(ClientError::Io(std::io::Error::other(format!(
                    "exchange task failed: {e}"
                )))),
            })
    }
}
