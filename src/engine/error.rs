//! Error type for engine operations.
//!
//! Only structural problems surface here. Per-request transport failures are
//! recorded as that request's outcome, and a failed readiness poll ends the
//! batch with [`Completion::Aborted`](super::Completion::Aborted) instead.

use super::window::MIN_WINDOW_SIZE;

/// Errors returned by [`RequestEngine`](super::RequestEngine).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The effective window for a multi-request batch is below the minimum.
    #[error(
        "invalid window size {window} for {queued} queued requests: must be at least {MIN_WINDOW_SIZE}"
    )]
    InvalidWindow {
        /// The effective window after clamping to the queue length.
        window: usize,
        /// Number of queued requests.
        queued: usize,
    },

    /// The batch payload could not be encoded as JSON.
    #[error("failed to encode request payload: {0}")]
    Payload(#[from] serde_json::Error),
}
