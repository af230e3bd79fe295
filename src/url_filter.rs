//! URL sanitization and validation for outgoing requests.
//!
//! [`normalize`] never fails: a URL that cannot be made valid yields `None`
//! and the request later fails in the transport with an invalid-URL error.

use tracing::{debug, trace};
use url::Url;

/// Longest URL accepted before parsing.
pub const MAX_URL_LENGTH: usize = 2000;

/// Characters kept by [`sanitize`] besides ASCII letters and digits.
const URL_SAFE_PUNCTUATION: &str = "$-_.+!*'(),{}|\\^~[]`<>#%\";/?:@&=";

/// Removes every character that cannot appear in a URL.
///
/// Whitespace, control characters and non-ASCII characters are dropped.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || URL_SAFE_PUNCTUATION.contains(*c))
        .collect()
}

/// Sanitizes and validates `raw`, returning the normalized URL.
///
/// # Validation rules
/// - Must not exceed [`MAX_URL_LENGTH`] after sanitizing
/// - Must be parseable by the `url` crate
/// - Must use http or https
/// - Must have a host
#[must_use]
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned = sanitize(raw);
    trace!(raw, cleaned = %cleaned, "sanitized URL");

    if cleaned.is_empty() || cleaned.len() > MAX_URL_LENGTH {
        debug!(len = cleaned.len(), "URL rejected by length");
        return None;
    }

    let parsed = match Url::parse(&cleaned) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(url = %cleaned, error = %e, "URL rejected as malformed");
            return None;
        }
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        debug!(url = %cleaned, scheme = parsed.scheme(), "URL rejected by scheme");
        return None;
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        debug!(url = %cleaned, "URL rejected without host");
        return None;
    }

    Some(parsed.to_string())
}
