//! reqwest-backed [`Transport`].
//!
//! Client-level settings (TLS verification, connect timeout, redirect cap and
//! proxy) differ between calls, so clients are cached per [`ClientProfile`]
//! and reused, keeping connection pooling for repeated destinations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::{Client, Proxy};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, trace};

use super::{ResponseOutput, Transport, TransportError, TransportResponse};
use crate::options::{ProxyOptions, TransportOptions};
use crate::request::Method;
use crate::user_agent;

/// Settings that must be fixed when a reqwest client is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientProfile {
    verify_tls: bool,
    connect_timeout: Duration,
    max_redirects: Option<usize>,
    proxy: Option<ProxyOptions>,
}

impl From<&TransportOptions> for ClientProfile {
    fn from(options: &TransportOptions) -> Self {
        Self {
            verify_tls: options.verify_tls,
            connect_timeout: options.connect_timeout,
            max_redirects: options.max_redirects,
            proxy: options.proxy.clone(),
        }
    }
}

/// HTTP transport built on reqwest.
///
/// Cheap to clone; clones share the client cache.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    clients: Arc<DashMap<ClientProfile, Client>>,
}

impl HttpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct clients built so far.
    #[must_use]
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }

    fn client_for(&self, options: &TransportOptions) -> Result<Client, TransportError> {
        let profile = ClientProfile::from(options);
        if let Some(client) = self.clients.get(&profile) {
            return Ok(client.clone());
        }
        let client = build_client(&profile).map_err(|source| TransportError::Client { source })?;
        debug!(
            verify_tls = profile.verify_tls,
            proxied = profile.proxy.is_some(),
            "built HTTP client for new profile"
        );
        self.clients.insert(profile, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, options), fields(url = options.url.as_deref().unwrap_or_default()))]
    async fn perform(
        &self,
        options: &TransportOptions,
    ) -> Result<TransportResponse, TransportError> {
        let url = options.url.as_deref().ok_or(TransportError::MissingUrl)?;
        let client = self.client_for(options)?;

        let method = if options.no_body {
            reqwest::Method::HEAD
        } else {
            to_reqwest_method(options.method)
        };
        let mut request = client.request(method, url).timeout(options.timeout);

        for line in &options.headers {
            let Some((name, value)) = line.split_once(':') else {
                return Err(TransportError::invalid_header(line));
            };
            let value = value.trim();
            // An empty value suppresses the header (e.g. `Expect:`).
            if value.is_empty() {
                continue;
            }
            request = request.header(name.trim(), value);
        }

        if let Some(auth) = &options.basic_auth {
            let (user, password) = auth.split_once(':').unwrap_or((auth.as_str(), ""));
            request = request.basic_auth(user, Some(password));
        }

        if !options.no_body
            && let Some(body) = &options.body
        {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, e))?;

        let status = response.status().as_u16();
        let version = response.version();
        let headers = collect_headers(response.headers());
        debug!(status, "response received");

        let output = if options.no_body {
            ResponseOutput::Body(Vec::new())
        } else if let Some(path) = &options.file_sink {
            stream_to_sink(response, url, path).await?
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| TransportError::from_reqwest(url, e))?;
            ResponseOutput::Body(bytes.to_vec())
        };

        let output = if options.include_response_headers {
            prefix_header_block(output, &format!("{version:?}"), status, &headers)
        } else {
            output
        };

        Ok(TransportResponse {
            status,
            headers,
            output,
        })
    }
}

fn build_client(profile: &ClientProfile) -> Result<Client, reqwest::Error> {
    let redirect = match profile.max_redirects {
        Some(max) => Policy::limited(max),
        None => Policy::none(),
    };
    // Proxy choice is made per request by the engine, never from the environment.
    let mut builder = Client::builder()
        .no_proxy()
        .connect_timeout(profile.connect_timeout)
        .redirect(redirect)
        .danger_accept_invalid_certs(!profile.verify_tls)
        .gzip(true)
        .user_agent(user_agent::default_user_agent());

    if let Some(proxy) = &profile.proxy {
        let mut resolved = Proxy::all(proxy.url())?;
        if let Some(credentials) = &proxy.credentials {
            let (user, password) = credentials
                .split_once(':')
                .unwrap_or((credentials.as_str(), ""));
            resolved = resolved.basic_auth(user, password);
        }
        builder = builder.proxy(resolved);
    }

    builder.build()
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Prepends the status line and header block to an in-memory body.
fn prefix_header_block(
    output: ResponseOutput,
    version: &str,
    status: u16,
    headers: &[(String, String)],
) -> ResponseOutput {
    let ResponseOutput::Body(body) = output else {
        return output;
    };
    let mut block = format!("{version} {status}\r\n");
    for (name, value) in headers {
        block.push_str(&format!("{name}: {value}\r\n"));
    }
    block.push_str("\r\n");
    let mut bytes = block.into_bytes();
    bytes.extend_from_slice(&body);
    ResponseOutput::Body(bytes)
}

/// Streams the response body into `path`, appending, and returns the sink output.
async fn stream_to_sink(
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<ResponseOutput, TransportError> {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| TransportError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| TransportError::from_reqwest(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransportError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| TransportError::io(path, e))?;
    trace!(path = %path.display(), bytes_written, "response written to sink");

    Ok(ResponseOutput::Sink {
        path: path.to_path_buf(),
        bytes_written,
    })
}
