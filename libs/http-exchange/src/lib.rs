//! Single-use HTTP exchanges with a fluent builder.
//!
//! A [`Request`] collects headers, query or form parameters, a body, timeouts,
//! a proxy and an optional pinned certificate, then performs exactly one
//! round trip. The resulting [`Response`] exposes status and headers right
//! away and reads the body lazily: buffered, streamed, or written to a sink.
//!
//! Connections, TLS, proxy tunnelling and HTTP framing are delegated to
//! `reqwest`; redirects are never followed, so a 3xx is returned as is.
//!
//! Exchanges run on a [`Dispatcher`], an explicitly created worker pool that
//! offers three ways to send:
//!
//! - [`Dispatcher::send`] blocks the calling thread;
//! - [`Dispatcher::submit`] returns a [`PendingResponse`] future/handle;
//! - [`Dispatcher::submit_with`] hands the outcome to a callback on a pool thread.
//!
//! Async code can skip the dispatcher and `.await` [`Request::send`] directly.
//!
//! # Examples
//!
//! ## Blocking Usage
//!
//! ```no_run
//! use http_exchange::{Dispatcher, DispatcherConfig, Request};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::new(DispatcherConfig::from_env()?)?;
//!
//! let request = Request::get("https://example.com/search")
//!     .param("q", "rust http")
//!     .header("Accept", "text/html")?;
//!
//! let mut response = dispatcher.send(request)?;
//! println!("{} {}", response.code(), response.message());
//! let body = response.text_blocking()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use http_exchange::Request;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut response = Request::post("https://example.com/api/items")
//!     .header("Content-Type", "application/json")?
//!     .body(serde_json::to_vec(&json!({"name": "widget"}))?)
//!     .send()
//!     .await?;
//!
//! let created: serde_json::Value = response.json().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Callback Usage
//!
//! ```no_run
//! use http_exchange::{Dispatcher, DispatcherConfig, Request};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::new(DispatcherConfig::default())?;
//!
//! dispatcher.submit_with(Request::get("https://example.com/"), |mut response| {
//!     if response.code() == -1 {
//!         eprintln!("failed: {}", response.message());
//!     } else if let Ok(body) = response.bytes_blocking() {
//!         println!("received {} bytes", body.len());
//!     }
//! });
//! # Ok(())
//! # }
//! ```

mod body;
mod dispatcher;
mod encoding;
mod error;
mod progress;
mod request;
mod response;
mod tls;

// Re-export public API
pub use body::{Body, BoxStream};
pub use dispatcher::{Dispatcher, DispatcherConfig, PendingResponse};
pub use encoding::{url_decode, url_encode};
pub use error::{ClientError, ErrorKind};
pub use progress::ProgressListener;
pub use request::Request;
pub use response::{BodyReader, FAILED_STATUS_CODE, Response};
pub use tls::TrustedRoot;

// Re-export commonly used types from dependencies
pub use http::{HeaderMap, Method, StatusCode};
