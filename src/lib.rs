//! Batchfetch Core Library
//!
//! Runs batches of outbound HTTP requests with a bounded number in flight,
//! routes each request through a proxy chosen by destination, and returns
//! results either through a callback or ordered by submission index. A probe
//! mode classifies URLs as reachable with short, body-less requests.
//!
//! # Architecture
//!
//! - [`request`] - Request value objects and per-request overrides
//! - [`options`] - Finalized transport options and engine defaults
//! - [`url_filter`] - URL sanitizing and validation
//! - [`proxy`] - Proxy settings and internal-address bypass
//! - [`transport`] - The transport seam and its reqwest implementation
//! - [`engine`] - Option building, single and windowed execution, the façade
//! - [`config`] - File configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod options;
pub mod proxy;
pub mod request;
pub mod transport;
pub mod url_filter;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig};
pub use engine::{
    BatchResult, Callback, Completion, EngineError, ExecuteOutcome, Outcome, ProcessParams,
    RequestEngine, ResponseRecord, callback,
};
pub use options::{EngineConfig, ProxyOptions, TransportOptions};
pub use proxy::{EnvProxySource, ProxySettings, ProxySource, StaticProxySource};
pub use request::{Method, OptionOverrides, Request, RequestBody};
pub use transport::{
    HttpTransport, ResponseMetadata, ResponseOutput, Transport, TransportError,
    TransportResponse,
};
