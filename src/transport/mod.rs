//! Transport layer: performs one HTTP call described by [`TransportOptions`].
//!
//! The engine talks to the network only through the [`Transport`] trait, so a
//! scripted transport can stand in for the network in tests.
//!
//! # Example
//!
//! ```no_run
//! use batchfetch_core::options::TransportOptions;
//! use batchfetch_core::transport::{HttpTransport, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new();
//! let options = TransportOptions {
//!     url: Some("https://example.com/".to_string()),
//!     ..TransportOptions::default()
//! };
//! let response = transport.perform(&options).await?;
//! println!("HTTP {}", response.status);
//! # Ok(())
//! # }
//! ```

mod error;
mod http;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

pub use error::TransportError;
pub use http::HttpTransport;

use crate::options::TransportOptions;

/// Performs HTTP calls.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Runs one call to completion.
    ///
    /// HTTP error statuses are not errors here: a 404 is a successful call
    /// that returned status 404.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the call could not complete.
    async fn perform(&self, options: &TransportOptions)
    -> Result<TransportResponse, TransportError>;
}

/// What the transport produced for a finished call.
#[derive(Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub output: ResponseOutput,
}

impl TransportResponse {
    /// A response carrying an in-memory body.
    #[must_use]
    pub fn with_body(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            output: ResponseOutput::Body(body.into()),
        }
    }

    /// Looks up a response header case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Raw output of one call.
#[derive(Debug)]
pub enum ResponseOutput {
    /// Response body returned as a value.
    Body(Vec<u8>),
    /// Response body written to a file sink.
    Sink {
        path: PathBuf,
        bytes_written: u64,
    },
    /// The call failed before producing output.
    Failed(TransportError),
}

impl ResponseOutput {
    /// The in-memory body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Self::Body(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The body decoded as UTF-8 (lossy).
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.body()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// The failure, if the call failed.
    #[must_use]
    pub fn error(&self) -> Option<&TransportError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Number of body bytes received.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Body(bytes) => bytes.len() as u64,
            Self::Sink { bytes_written, .. } => *bytes_written,
            Self::Failed(_) => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Information about a finished call, delivered alongside its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// URL as submitted by the caller.
    pub url: String,
    /// HTTP status, `None` when the call failed at transport level.
    pub status: Option<u16>,
    /// Wall-clock time spent in the transport.
    pub elapsed: Duration,
    pub content_type: Option<String>,
    /// Body bytes received.
    pub content_length: u64,
    pub headers: Vec<(String, String)>,
}

impl ResponseMetadata {
    /// Metadata for a completed call.
    #[must_use]
    pub fn completed(url: impl Into<String>, response: &TransportResponse, elapsed: Duration) -> Self {
        Self {
            url: url.into(),
            status: Some(response.status),
            elapsed,
            content_type: response.header("content-type").map(str::to_string),
            content_length: response.output.len(),
            headers: response.headers.clone(),
        }
    }

    /// Metadata for a call that failed at transport level.
    #[must_use]
    pub fn failed(url: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            url: url.into(),
            status: None,
            elapsed,
            content_type: None,
            content_length: 0,
            headers: Vec::new(),
        }
    }

    /// Whether the status counts as reachable: `200 <= status < 400`.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        is_reachable_status(self.status)
    }
}

/// Reachability classification used by probe mode.
#[must_use]
pub fn is_reachable_status(status: Option<u16>) -> bool {
    status.is_some_and(|code| (200..400).contains(&code))
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
