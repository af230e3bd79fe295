//! Batch request engine.
//!
//! [`RequestEngine`] owns a queue of pending [`Request`]s and runs them as one
//! batch on [`execute`](RequestEngine::execute). A single queued request takes
//! a fast path; larger batches run through a rolling window that bounds how
//! many transports are in flight at once. Results come back either through a
//! registered callback, as each request finishes, or as a [`BatchResult`]
//! ordered by submission index.
//!
//! # Example
//!
//! ```no_run
//! use batchfetch_core::{EngineConfig, ExecuteOutcome, RequestEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = RequestEngine::with_http_transport(EngineConfig::default());
//! engine
//!     .get("https://example.com/a", Vec::new(), None)
//!     .get("https://example.com/b", Vec::new(), None);
//!
//! if let ExecuteOutcome::Batch(batch) = engine.execute(Some(2), false).await? {
//!     for (index, outcome) in batch.outcomes() {
//!         println!("{index}: failed={}", outcome.is_failure());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
mod error;
mod outcome;
mod single;
mod window;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

pub use builder::{apply_probe_overrides, build_options};
pub use error::EngineError;
pub use outcome::{BatchResult, Completion, ExecuteOutcome, Outcome, ResponseRecord};
pub use window::{MIN_WINDOW_SIZE, effective_window};

use crate::options::{EngineConfig, TransportOptions};
use crate::proxy::{EnvProxySource, ProxySource};
use crate::request::{Method, OptionOverrides, Request, RequestBody};
use crate::transport::{
    HttpTransport, ResponseMetadata, ResponseOutput, Transport, TransportError,
    TransportResponse, is_reachable_status,
};

/// Receives each finished request's output in normal mode.
///
/// Invoked from the dispatch loop in completion order, one call at a time.
pub type Callback = Arc<dyn Fn(&ResponseOutput, &ResponseMetadata, &Request) + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&ResponseOutput, &ResponseMetadata, &Request) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Read-only state shared by every dispatch of one run.
pub(crate) struct RunContext<'a> {
    config: &'a EngineConfig,
    proxy: &'a dyn ProxySource,
    callback: Option<&'a Callback>,
    probe: bool,
}

impl RunContext<'_> {
    /// Finalized options for one launch of `request`.
    fn prepare(&self, request: &Request) -> TransportOptions {
        builder::prepare(request, self.config, self.proxy, self.probe)
    }

    /// Turns a finished call into the outcome stored at its index.
    ///
    /// Returns `None` when the outcome was handed to the callback instead.
    fn settle(
        &self,
        request: &Request,
        result: Result<TransportResponse, TransportError>,
        elapsed: Duration,
    ) -> Option<Outcome> {
        if self.probe {
            let status = match &result {
                Ok(response) => Some(response.status),
                Err(error) => {
                    debug!(url = request.url(), %error, "probe failed");
                    None
                }
            };
            return Some(Outcome::Available(is_reachable_status(status)));
        }

        let (output, metadata) = match result {
            Ok(response) => {
                let metadata = ResponseMetadata::completed(request.url(), &response, elapsed);
                (response.output, metadata)
            }
            Err(error) => {
                warn!(url = request.url(), %error, "request failed");
                (
                    ResponseOutput::Failed(error),
                    ResponseMetadata::failed(request.url(), elapsed),
                )
            }
        };

        if let Some(callback) = self.callback {
            callback(&output, &metadata, request);
            return None;
        }
        Some(Outcome::Response(ResponseRecord { output, metadata }))
    }
}

/// Parameters for [`RequestEngine::process`].
#[derive(Clone, Default)]
pub struct ProcessParams {
    pub method: Method,
    /// Shared payload for every request. Objects are form-encoded unless
    /// `as_json` is set; strings are sent as-is.
    pub data: Option<Value>,
    pub as_json: bool,
    /// `user:password` for HTTP basic auth.
    pub auth: Option<String>,
    pub callback: Option<Callback>,
    pub file_sink: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for ProcessParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessParams")
            .field("method", &self.method)
            .field("data", &self.data)
            .field("as_json", &self.as_json)
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .field("callback", &self.callback.is_some())
            .field("file_sink", &self.file_sink)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Queues requests and runs them as windowed batches.
pub struct RequestEngine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    proxy: Arc<dyn ProxySource>,
    callback: Option<Callback>,
    queue: Vec<Request>,
}

impl fmt::Debug for RequestEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEngine")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("proxy", &self.proxy)
            .field("callback", &self.callback.is_some())
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl RequestEngine {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        proxy: Arc<dyn ProxySource>,
    ) -> Self {
        Self {
            config,
            transport,
            proxy,
            callback: None,
            queue: Vec::new(),
        }
    }

    /// Engine backed by [`HttpTransport`] with proxy settings from the environment.
    #[must_use]
    pub fn with_http_transport(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(HttpTransport::new()),
            Arc::new(EnvProxySource::from_env()),
        )
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mutable access to the defaults shared by every later run.
    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    /// Registers a callback; later normal-mode runs deliver through it.
    pub fn set_callback(&mut self, callback: Callback) -> &mut Self {
        self.callback = Some(callback);
        self
    }

    pub fn clear_callback(&mut self) -> &mut Self {
        self.callback = None;
        self
    }

    /// Appends a request to the pending queue.
    pub fn add(&mut self, request: Request) -> &mut Self {
        self.queue.push(request);
        self
    }

    /// Builds and queues a request.
    pub fn request(
        &mut self,
        url: impl Into<String>,
        method: Method,
        body: Option<RequestBody>,
        headers: Vec<String>,
        options: Option<OptionOverrides>,
    ) -> &mut Self {
        let mut request = Request::new(url, method)
            .with_body(body)
            .with_headers(headers);
        if let Some(options) = options {
            request = request.with_options(options);
        }
        self.add(request)
    }

    pub fn get(
        &mut self,
        url: impl Into<String>,
        headers: Vec<String>,
        options: Option<OptionOverrides>,
    ) -> &mut Self {
        self.request(url, Method::Get, None, headers, options)
    }

    pub fn post(
        &mut self,
        url: impl Into<String>,
        body: Option<RequestBody>,
        headers: Vec<String>,
        options: Option<OptionOverrides>,
    ) -> &mut Self {
        self.request(url, Method::Post, body, headers, options)
    }

    /// Number of queued requests.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Runs every queued request and drains the queue.
    ///
    /// One request takes the fast path and ignores `window`. Larger batches
    /// use `window` (or the configured default) clamped to the queue length.
    /// In probe mode each outcome is [`Outcome::Available`] and the callback
    /// is not used.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWindow`] when a batch of two or more
    /// requests would run with a window below [`MIN_WINDOW_SIZE`]. The queue
    /// is left untouched in that case.
    #[instrument(skip(self), fields(pending = self.queue.len()))]
    pub async fn execute(
        &mut self,
        window: Option<usize>,
        probe: bool,
    ) -> Result<ExecuteOutcome, EngineError> {
        let queued = self.queue.len();
        if queued == 0 {
            debug!("nothing queued");
            return Ok(ExecuteOutcome::NoWork);
        }

        let effective = if queued == 1 {
            None
        } else {
            Some(effective_window(window, self.config.window_size, queued)?)
        };

        let requests = std::mem::take(&mut self.queue);
        let ctx = RunContext {
            config: &self.config,
            proxy: self.proxy.as_ref(),
            callback: if probe { None } else { self.callback.as_ref() },
            probe,
        };

        info!(queued, window = ?effective, probe, "batch started");
        let batch = match effective {
            None => {
                let mut requests = requests;
                match requests.pop() {
                    Some(request) => {
                        single::run_single(&ctx, self.transport.as_ref(), request).await
                    }
                    None => return Ok(ExecuteOutcome::NoWork),
                }
            }
            Some(size) => {
                window::WindowedScheduler::new(&ctx, Arc::clone(&self.transport), size)
                    .run(requests)
                    .await
            }
        };
        info!(
            stored = batch.len(),
            failures = batch.failures(),
            complete = batch.is_complete(),
            "batch finished"
        );
        Ok(ExecuteOutcome::Batch(batch))
    }

    /// Queues one request per URL with a shared payload and runs the queue.
    ///
    /// `GET` requests are sent without the payload. Any other method carries
    /// it and keeps its own verb.
    ///
    /// The timeout, auth, callback and file sink in `params` are written
    /// into the engine configuration and stay in effect for later runs. JSON
    /// mode also adds `Content-Type: application/json` and a suppressed
    /// `Expect:` to the default headers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Payload`] when `data` cannot be JSON-encoded,
    /// or any error from [`execute`](Self::execute).
    #[instrument(skip_all, fields(urls = urls.len(), method = %params.method, as_json = params.as_json))]
    pub async fn process(
        &mut self,
        urls: &[String],
        params: ProcessParams,
    ) -> Result<ExecuteOutcome, EngineError> {
        // GET requests never carry the shared payload.
        let body = match &params.data {
            Some(_) if params.method == Method::Get => {
                debug!("ignoring payload for GET requests");
                None
            }
            Some(data) => encode_payload(data, params.as_json)?,
            None => None,
        };

        let overrides = OptionOverrides {
            timeout: params.timeout,
            basic_auth: params.auth,
            file_sink: params.file_sink,
            ..OptionOverrides::default()
        };
        if !overrides.is_empty() {
            self.config.merge_options(&overrides);
        }
        if let Some(callback) = params.callback {
            self.callback = Some(callback);
        }
        if params.as_json {
            self.config
                .merge_headers(["Content-Type: application/json", "Expect:"]);
        }

        let mut headers = Vec::new();
        if params.as_json
            && let Some(body) = &body
        {
            headers.push(format!("Content-Length: {}", body.to_bytes().len()));
        }

        for url in urls {
            self.request(
                url.clone(),
                params.method,
                body.clone(),
                headers.clone(),
                None,
            );
        }
        self.execute(None, false).await
    }

    /// Probes each URL and reports whether it answered with `200..400`.
    ///
    /// Runs as its own batch; requests queued earlier stay queued. Any URL
    /// without an outcome (transport failure or aborted batch) is `false`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWindow`] only if the configured default
    /// window is below [`MIN_WINDOW_SIZE`].
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn is_available(&mut self, urls: &[String]) -> Result<Vec<bool>, EngineError> {
        let held = std::mem::take(&mut self.queue);
        for url in urls {
            self.add(Request::get(url.clone()));
        }

        let result = self.execute(None, true).await;
        // execute leaves the queue untouched on error
        self.queue.clear();
        self.queue.extend(held);

        Ok(match result? {
            ExecuteOutcome::NoWork => Vec::new(),
            ExecuteOutcome::Batch(batch) => batch.availability(urls.len()),
        })
    }
}

/// Encodes the shared `process` payload.
fn encode_payload(data: &Value, as_json: bool) -> Result<Option<RequestBody>, EngineError> {
    let body = match data {
        Value::Null => return Ok(None),
        _ if as_json => RequestBody::Bytes(serde_json::to_vec(data)?),
        Value::String(text) => RequestBody::from(text.as_str()),
        Value::Object(map) => RequestBody::Form(
            map.iter()
                .map(|(key, value)| (key.clone(), form_value(value)))
                .collect(),
        ),
        other => RequestBody::from(other.to_string()),
    };
    Ok(Some(body))
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
