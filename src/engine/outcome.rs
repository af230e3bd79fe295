//! Result types returned by [`RequestEngine::execute`](super::RequestEngine::execute).

use std::collections::BTreeMap;

use crate::transport::{ResponseMetadata, ResponseOutput};

/// Output and metadata of one completed request.
#[derive(Debug)]
pub struct ResponseRecord {
    pub output: ResponseOutput,
    pub metadata: ResponseMetadata,
}

/// Outcome stored at a request's submission index.
#[derive(Debug)]
pub enum Outcome {
    /// Normal mode: what the transport produced.
    Response(ResponseRecord),
    /// Probe mode: whether the URL answered with `200..400`.
    Available(bool),
}

impl Outcome {
    #[must_use]
    pub fn as_response(&self) -> Option<&ResponseRecord> {
        match self {
            Self::Response(record) => Some(record),
            Self::Available(_) => None,
        }
    }

    #[must_use]
    pub fn into_response(self) -> Option<ResponseRecord> {
        match self {
            Self::Response(record) => Some(record),
            Self::Available(_) => None,
        }
    }

    #[must_use]
    pub fn availability(&self) -> Option<bool> {
        match self {
            Self::Available(available) => Some(*available),
            Self::Response(_) => None,
        }
    }

    /// Whether the request failed (transport failure or unreachable probe).
    #[must_use]
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Response(record) => record.output.is_failed(),
            Self::Available(available) => !available,
        }
    }
}

/// How a batch run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Every launched request reached a terminal state.
    Complete,
    /// The readiness poll failed; outcomes hold only what finished before.
    Aborted { reason: String },
}

/// Outcomes of one batch, keyed and ordered by submission index.
#[derive(Debug)]
pub struct BatchResult {
    outcomes: BTreeMap<usize, Outcome>,
    completion: Completion,
}

impl BatchResult {
    pub(crate) fn new(outcomes: BTreeMap<usize, Outcome>, completion: Completion) -> Self {
        Self {
            outcomes,
            completion,
        }
    }

    pub(crate) fn complete(outcomes: BTreeMap<usize, Outcome>) -> Self {
        Self::new(outcomes, Completion::Complete)
    }

    #[must_use]
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }

    /// Outcomes in ascending submission order.
    #[must_use]
    pub fn outcomes(&self) -> &BTreeMap<usize, Outcome> {
        &self.outcomes
    }

    #[must_use]
    pub fn into_outcomes(self) -> BTreeMap<usize, Outcome> {
        self.outcomes
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Outcome> {
        self.outcomes.get(&index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of stored outcomes that are failures.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_failure()).count()
    }

    /// One boolean per submitted request; indices without an outcome are `false`.
    #[must_use]
    pub fn availability(&self, submitted: usize) -> Vec<bool> {
        (0..submitted)
            .map(|index| {
                self.outcomes
                    .get(&index)
                    .and_then(Outcome::availability)
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Result of [`RequestEngine::execute`](super::RequestEngine::execute).
#[derive(Debug)]
pub enum ExecuteOutcome {
    /// The queue was empty.
    NoWork,
    /// The queue was run as a batch.
    Batch(BatchResult),
}

impl ExecuteOutcome {
    #[must_use]
    pub fn is_no_work(&self) -> bool {
        matches!(self, Self::NoWork)
    }

    #[must_use]
    pub fn batch(&self) -> Option<&BatchResult> {
        match self {
            Self::Batch(batch) => Some(batch),
            Self::NoWork => None,
        }
    }

    #[must_use]
    pub fn into_batch(self) -> Option<BatchResult> {
        match self {
            Self::Batch(batch) => Some(batch),
            Self::NoWork => None,
        }
    }
}
