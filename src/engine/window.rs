//! Rolling-window scheduler for batches of two or more requests.
//!
//! At most `window` transports are in flight. Each finished transport frees
//! a slot that is refilled with the next queued request, in strict
//! submission order, until the queue is exhausted. Outcomes are stored by
//! submission index so the returned batch is ordered regardless of which
//! transport finished first.
//!
//! Every launched transport gets a fresh [`SlotId`] from a counter owned by
//! the scheduler. Ids are never reused, so a finished transport can never be
//! confused with the one launched into its slot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::error::EngineError;
use super::outcome::{BatchResult, Completion};
use super::RunContext;
use crate::options::{PROBE_CONNECT_TIMEOUT, PROBE_TIMEOUT};
use crate::request::Request;
use crate::transport::{Transport, TransportError, TransportResponse};

/// Smallest window the scheduler will run with.
pub const MIN_WINDOW_SIZE: usize = 2;

/// Extra time the readiness poll waits beyond the longest call timeout.
const POLL_GRACE: Duration = Duration::from_secs(5);

/// Scheduler-issued identity of one launched transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SlotId(u64);

/// What a transport task hands back to the poll loop.
struct Finished {
    slot: SlotId,
    result: Result<TransportResponse, TransportError>,
    elapsed: Duration,
}

/// Computes the window for a batch of `queued` requests.
///
/// The requested size (or `default` when absent or zero) is clamped to the
/// queue length. A result below [`MIN_WINDOW_SIZE`] is an error rather than a
/// silent fallback to sequential execution.
///
/// # Errors
///
/// Returns [`EngineError::InvalidWindow`] when the clamped window is below 2.
pub fn effective_window(
    requested: Option<usize>,
    default: usize,
    queued: usize,
) -> Result<usize, EngineError> {
    let window = requested.filter(|w| *w > 0).unwrap_or(default).min(queued);
    if window < MIN_WINDOW_SIZE {
        return Err(EngineError::InvalidWindow { window, queued });
    }
    Ok(window)
}

pub(crate) struct WindowedScheduler<'a> {
    ctx: &'a RunContext<'a>,
    transport: Arc<dyn Transport>,
    window: usize,
    poll_timeout: Duration,
    next_slot: u64,
}

impl<'a> WindowedScheduler<'a> {
    pub(crate) fn new(
        ctx: &'a RunContext<'a>,
        transport: Arc<dyn Transport>,
        window: usize,
    ) -> Self {
        Self {
            ctx,
            transport,
            window,
            poll_timeout: Duration::ZERO,
            next_slot: 0,
        }
    }

    /// Runs every request and returns the outcomes ordered by index.
    #[instrument(skip_all, fields(window = self.window, queued = requests.len(), probe = self.ctx.probe))]
    pub(crate) async fn run(mut self, requests: Vec<Request>) -> BatchResult {
        self.poll_timeout = poll_timeout_for(&requests, self.ctx);

        let mut tasks: JoinSet<Finished> = JoinSet::new();
        let mut in_flight: HashMap<SlotId, usize> = HashMap::with_capacity(self.window);
        let mut outcomes = BTreeMap::new();
        let mut next_index = 0;

        while next_index < self.window.min(requests.len()) {
            self.launch(&mut tasks, &mut in_flight, next_index, &requests[next_index]);
            next_index += 1;
        }
        debug!(launched = next_index, "initial window launched");

        let completion = loop {
            let finished = match tokio::time::timeout(self.poll_timeout, tasks.join_next()).await
            {
                Ok(None) => break Completion::Complete,
                Ok(Some(Ok(finished))) => finished,
                Ok(Some(Err(join_error))) => {
                    warn!(error = %join_error, "transport task failed, ending batch early");
                    break Completion::Aborted {
                        reason: format!("transport task failed: {join_error}"),
                    };
                }
                Err(_) => {
                    warn!(
                        wait_secs = self.poll_timeout.as_secs(),
                        in_flight = in_flight.len(),
                        "no transport finished in time, ending batch early"
                    );
                    break Completion::Aborted {
                        reason: format!(
                            "no transport finished within {}s",
                            self.poll_timeout.as_secs()
                        ),
                    };
                }
            };

            let Some(index) = in_flight.remove(&finished.slot) else {
                warn!(slot = ?finished.slot, "completion for unknown slot ignored");
                continue;
            };
            debug!(
                index,
                ok = finished.result.is_ok(),
                elapsed_ms = finished.elapsed.as_millis(),
                "request finished"
            );

            if let Some(outcome) = self
                .ctx
                .settle(&requests[index], finished.result, finished.elapsed)
            {
                outcomes.insert(index, outcome);
            }

            if next_index < requests.len() {
                self.launch(&mut tasks, &mut in_flight, next_index, &requests[next_index]);
                next_index += 1;
            }
        };

        if !tasks.is_empty() {
            debug!(open = tasks.len(), "releasing open transports");
            tasks.shutdown().await;
        }

        info!(
            stored = outcomes.len(),
            launched = next_index,
            complete = completion == Completion::Complete,
            "windowed batch finished"
        );
        BatchResult::new(outcomes, completion)
    }

    fn launch(
        &mut self,
        tasks: &mut JoinSet<Finished>,
        in_flight: &mut HashMap<SlotId, usize>,
        index: usize,
        request: &Request,
    ) {
        let options = self.ctx.prepare(request);
        let slot = SlotId(self.next_slot);
        self.next_slot += 1;

        let transport = Arc::clone(&self.transport);
        tasks.spawn(async move {
            let started = Instant::now();
            let result = transport.perform(&options).await;
            Finished {
                slot,
                result,
                elapsed: started.elapsed(),
            }
        });
        in_flight.insert(slot, index);
        debug!(index, slot = slot.0, url = request.url(), "request launched");
    }
}

/// How long the poll waits for any transport before giving up on the batch.
///
/// Covers the slowest possible call in the batch: the longest total timeout
/// plus the longest connect timeout, plus grace.
fn poll_timeout_for(requests: &[Request], ctx: &RunContext<'_>) -> Duration {
    if ctx.probe {
        return PROBE_TIMEOUT + PROBE_CONNECT_TIMEOUT + POLL_GRACE;
    }
    let defaults = ctx.config.defaults();
    let overrides = requests.iter().filter_map(Request::options);

    let timeout = overrides
        .clone()
        .filter_map(|o| o.timeout)
        .fold(defaults.timeout, Duration::max);
    let connect = overrides
        .filter_map(|o| o.connect_timeout)
        .fold(defaults.connect_timeout, Duration::max);

    timeout.saturating_add(connect).saturating_add(POLL_GRACE)
}
