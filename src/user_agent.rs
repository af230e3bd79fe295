//! Default User-Agent string for outgoing requests.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/batchfetch";

/// Default User-Agent sent by the HTTP transport.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("batchfetch/{version} (+{PROJECT_UA_URL})")
}
