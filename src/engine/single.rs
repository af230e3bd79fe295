//! Fast path for a batch of exactly one request.

use std::collections::BTreeMap;

use tokio::time::Instant;
use tracing::{debug, instrument};

use super::outcome::BatchResult;
use super::RunContext;
use crate::request::Request;
use crate::transport::Transport;

/// Runs `request` to completion and settles its outcome at index 0.
///
/// With a callback registered the outcome is delivered to it and the
/// returned batch is empty.
#[instrument(skip_all, fields(url = request.url(), probe = ctx.probe))]
pub(crate) async fn run_single(
    ctx: &RunContext<'_>,
    transport: &dyn Transport,
    request: Request,
) -> BatchResult {
    let options = ctx.prepare(&request);
    let started = Instant::now();
    let result = transport.perform(&options).await;
    let elapsed = started.elapsed();
    debug!(
        ok = result.is_ok(),
        elapsed_ms = elapsed.as_millis(),
        "single request finished"
    );

    let mut outcomes = BTreeMap::new();
    if let Some(outcome) = ctx.settle(&request, result, elapsed) {
        outcomes.insert(0, outcome);
    }
    BatchResult::complete(outcomes)
}
