//! Error types for the transport layer.
//!
//! A transport error is never fatal to a batch: the engine records it as the
//! failed outcome of that one request and moves on.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while performing one HTTP call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request URL was rejected by the validator, so there is nothing to call.
    #[error("no valid destination URL")]
    MissingUrl,

    /// The call did not finish within its timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The connection could not be established (DNS, refused, TLS handshake).
    #[error("connection to {url} failed: {reason}")]
    Connection {
        /// The URL that could not be reached.
        url: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Any other network-level failure reported by the HTTP client.
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL being requested.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// A header line is not in `Name: value` form.
    #[error("invalid header line: {line}")]
    InvalidHeader {
        /// The offending header line.
        line: String,
    },

    /// Writing the response to the file sink failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The sink path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be built for the requested options.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a connection error.
    pub fn connection(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(line: impl Into<String>) -> Self {
        Self::InvalidHeader { line: line.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Maps a reqwest send/read error onto the matching variant.
    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(url)
        } else if error.is_connect() {
            Self::connection(url, error.to_string())
        } else {
            Self::network(url, error)
        }
    }
}
