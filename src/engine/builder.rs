//! Per-request option assembly.
//!
//! Rules run in a fixed order and later rules win on conflict:
//! 1. engine defaults
//! 2. redirect following (unless sandboxed)
//! 3. URL validation
//! 4. per-request overrides
//! 5. destination URL and method
//! 6. body attachment
//! 7. custom headers
//! 8. proxy routing

use tracing::{debug, trace};

use crate::options::{
    EngineConfig, MAX_REDIRECTS, PROBE_CONNECT_TIMEOUT, PROBE_TIMEOUT, TransportOptions,
    header_name, upsert_header,
};
use crate::proxy::{self, ProxySource};
use crate::request::{Method, Request, RequestBody};
use crate::url_filter;

const FORM_CONTENT_TYPE: &str = "Content-Type: application/x-www-form-urlencoded";

/// Produces the finalized transport options for `request`.
///
/// Pure with respect to its inputs: the same request, config and proxy
/// answers always yield the same options.
#[must_use]
pub fn build_options(
    request: &Request,
    config: &EngineConfig,
    proxy_source: &dyn ProxySource,
) -> TransportOptions {
    let mut options = config.defaults().clone();

    if !config.sandboxed {
        options.max_redirects = Some(MAX_REDIRECTS);
    }

    let url = url_filter::normalize(request.url());
    if url.is_none() {
        // Left unset on purpose; the transport reports the failure for this request.
        debug!(url = request.url(), "request URL failed validation");
    }

    if let Some(overrides) = request.options() {
        overrides.apply_to(&mut options);
    }

    options.url = url;
    options.method = request.method();

    let mut headers = config.headers().to_vec();
    for line in request.headers() {
        upsert_header(&mut headers, line.clone());
    }

    if let Some(body) = request.body() {
        if matches!(options.method, Method::Get | Method::Head) {
            options.method = Method::Post;
        }
        options.body = Some(body.to_bytes());
        if matches!(body, RequestBody::Form(_))
            && !headers
                .iter()
                .any(|line| header_name(line).eq_ignore_ascii_case("content-type"))
        {
            headers.push(FORM_CONTENT_TYPE.to_string());
        }
    }

    if !headers.is_empty() {
        options.include_response_headers = false;
        options.headers = headers;
    }

    if let Some(url) = options.url.as_deref()
        && let Some(proxy) = proxy::proxy_for(url, proxy_source)
    {
        trace!(url, proxy = %proxy.url(), "routing through proxy");
        options.proxy = Some(proxy);
    }

    options
}

/// Switches options to a fast status-only probe.
pub fn apply_probe_overrides(options: &mut TransportOptions) {
    options.timeout = PROBE_TIMEOUT;
    options.connect_timeout = PROBE_CONNECT_TIMEOUT;
    options.no_body = true;
    options.include_response_headers = true;
    options.file_sink = None;
}

/// Builds options for one dispatch, applying probe overrides when probing.
#[must_use]
pub(crate) fn prepare(
    request: &Request,
    config: &EngineConfig,
    proxy_source: &dyn ProxySource,
    probe: bool,
) -> TransportOptions {
    let mut options = build_options(request, config, proxy_source);
    if probe {
        apply_probe_overrides(&mut options);
    }
    options
}
