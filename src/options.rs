//! Transport option model and engine-wide defaults.
//!
//! [`TransportOptions`] is the finalized configuration for one transport call.
//! [`EngineConfig`] holds the defaults every call starts from, plus the
//! default header list. Both defaults and headers are changed through
//! merge-on-write setters: new entries are layered over existing ones.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::request::{Method, OptionOverrides};

/// Default connect timeout (15 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default overall request timeout (one day).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Redirect cap applied when redirects are allowed.
pub const MAX_REDIRECTS: usize = 5;

/// Default rolling window size.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Overall timeout used for reachability probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1200);

/// Connect timeout used for reachability probes.
pub const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Proxy authentication scheme. Only basic auth is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProxyAuth {
    #[default]
    Basic,
}

/// Proxy endpoint injected into a call's options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyOptions {
    pub address: String,
    pub port: u16,
    pub auth: ProxyAuth,
    /// `user:password` credential string, set only when a username is configured.
    pub credentials: Option<String>,
}

impl ProxyOptions {
    /// Proxy URL in `http://address:port` form.
    #[must_use]
    pub fn url(&self) -> String {
        if self.address.contains("://") {
            format!("{}:{}", self.address.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.address, self.port)
        }
    }
}

/// Finalized configuration for a single transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Destination URL. `None` when the validator rejected the request URL.
    pub url: Option<String>,
    pub method: Method,
    pub body: Option<Vec<u8>>,
    /// Raw `Name: value` header lines. An empty value suppresses the header.
    pub headers: Vec<String>,
    /// Prefix the output with the response status line and headers.
    pub include_response_headers: bool,
    pub verify_tls: bool,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    /// Redirect cap, `None` disables redirect following.
    pub max_redirects: Option<usize>,
    pub proxy: Option<ProxyOptions>,
    /// `user:password` for HTTP basic auth against the destination.
    pub basic_auth: Option<String>,
    /// Write the response body to this file instead of returning it.
    pub file_sink: Option<PathBuf>,
    /// Fetch status and headers only.
    pub no_body: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            url: None,
            method: Method::Get,
            body: None,
            headers: Vec::new(),
            include_response_headers: false,
            verify_tls: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
            max_redirects: None,
            proxy: None,
            basic_auth: None,
            file_sink: None,
            no_body: false,
        }
    }
}

/// Engine-wide configuration shared by every request of every run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    defaults: TransportOptions,
    headers: Vec<String>,
    /// Blocks redirect following when set (restricted hosting environments).
    pub sandboxed: bool,
    /// Window used when `execute` is called without an explicit size.
    pub window_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            defaults: TransportOptions::default(),
            headers: Vec::new(),
            sandboxed: false,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default options every call starts from.
    #[must_use]
    pub fn defaults(&self) -> &TransportOptions {
        &self.defaults
    }

    /// Default header lines sent with every call.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Layers `overrides` on top of the current defaults; set fields win.
    pub fn merge_options(&mut self, overrides: &OptionOverrides) -> &mut Self {
        overrides.apply_to(&mut self.defaults);
        self
    }

    /// Layers `lines` over the default headers.
    ///
    /// A line whose header name matches an existing line (case-insensitive)
    /// replaces it in place; other lines are appended.
    pub fn merge_headers<I, S>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            upsert_header(&mut self.headers, line.into());
        }
        self
    }

    /// Overall timeout applied to calls and to the scheduler's poll wait.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.defaults.timeout
    }
}

/// Returns the header name of a raw `Name: value` line, trimmed.
#[must_use]
pub fn header_name(line: &str) -> &str {
    line.split_once(':').map_or(line, |(name, _)| name).trim()
}

/// Replaces the line with the same header name or appends a new one.
pub fn upsert_header(headers: &mut Vec<String>, line: String) {
    let name = header_name(&line);
    match headers
        .iter()
        .position(|existing| header_name(existing).eq_ignore_ascii_case(name))
    {
        Some(pos) => headers[pos] = line,
        None => headers.push(line),
    }
}
