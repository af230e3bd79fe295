//! Request value objects queued on a [`RequestEngine`](crate::RequestEngine).
//!
//! A [`Request`] describes one HTTP call. It is immutable once built and is
//! owned by the engine queue until it is dispatched.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::options::{ProxyOptions, TransportOptions};

/// HTTP method for a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    /// Returns the canonical upper-case method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }

    /// Parses a method name case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "HEAD" => Some(Self::Head),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Raw bytes sent as-is.
    Bytes(Vec<u8>),
    /// Key/value pairs sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// Encodes the body into the bytes that go on the wire.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bytes(bytes) => bytes.clone(),
            Self::Form(pairs) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .finish()
                .into_bytes(),
        }
    }

    /// Whether the encoded body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Form(pairs) => pairs.is_empty(),
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}

/// Per-request transport overrides.
///
/// Every field left as `None` keeps the engine default. Set fields win over
/// the defaults when the final options are assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionOverrides {
    pub verify_tls: Option<bool>,
    pub connect_timeout: Option<Duration>,
    pub timeout: Option<Duration>,
    pub max_redirects: Option<Option<usize>>,
    pub include_response_headers: Option<bool>,
    pub basic_auth: Option<String>,
    pub file_sink: Option<PathBuf>,
    pub no_body: Option<bool>,
    pub proxy: Option<ProxyOptions>,
}

impl OptionOverrides {
    /// Writes every set field over `options`.
    pub fn apply_to(&self, options: &mut TransportOptions) {
        if let Some(verify) = self.verify_tls {
            options.verify_tls = verify;
        }
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = timeout;
        }
        if let Some(timeout) = self.timeout {
            options.timeout = timeout;
        }
        if let Some(redirects) = self.max_redirects {
            options.max_redirects = redirects;
        }
        if let Some(include) = self.include_response_headers {
            options.include_response_headers = include;
        }
        if let Some(auth) = &self.basic_auth {
            options.basic_auth = Some(auth.clone());
        }
        if let Some(sink) = &self.file_sink {
            options.file_sink = Some(sink.clone());
        }
        if let Some(no_body) = self.no_body {
            options.no_body = no_body;
        }
        if let Some(proxy) = &self.proxy {
            options.proxy = Some(proxy.clone());
        }
    }

    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One HTTP call waiting in the engine queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: String,
    method: Method,
    body: Option<RequestBody>,
    headers: Vec<String>,
    options: Option<OptionOverrides>,
}

impl Request {
    /// Creates a request with the given URL and method and no extras.
    #[must_use]
    pub fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            headers: Vec::new(),
            options: None,
        }
    }

    /// Shorthand for a `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, Method::Get)
    }

    /// Shorthand for a `POST` request with an optional body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: Option<RequestBody>) -> Self {
        Self::new(url, Method::Post).with_body(body)
    }

    /// Attaches a body. An empty body is treated as no body.
    #[must_use]
    pub fn with_body(mut self, body: Option<RequestBody>) -> Self {
        self.body = body.filter(|b| !b.is_empty());
        self
    }

    /// Attaches raw `Name: value` header lines.
    #[must_use]
    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches per-request transport overrides.
    #[must_use]
    pub fn with_options(mut self, options: OptionOverrides) -> Self {
        self.options = (!options.is_empty()).then_some(options);
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn options(&self) -> Option<&OptionOverrides> {
        self.options.as_ref()
    }
}
