//! Phase executors
//!
//! Each executor takes the rows a selection chose, as exclusive borrows of disjoint records,
//! and runs its collaborator for each of them with bounded concurrency. Record state is only
//! written here, and only on success.

mod conversion;
mod retrieval;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use conversion::ConversionExecutor;
pub use retrieval::RetrievalExecutor;

use crate::error::Error;
use crate::record::Record;
use crate::selection::SkipReason;
use crate::types::Phase;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What happened to one row in one phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The collaborator succeeded
    Success {
        /// Wall-clock time of the collaborator call
        elapsed: Duration,
    },
    /// The collaborator failed, timed out or was interrupted
    Failure {
        /// Why
        reason: String,
    },
    /// The row was not processed
    Skipped {
        /// Why
        reason: SkipReason,
    },
}

/// Outcome of one row in one phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOutcome {
    /// Dataset name
    pub dataset: String,
    /// Phase the outcome belongs to
    pub phase: Phase,
    /// What happened
    pub result: OutcomeKind,
}

impl RowOutcome {
    /// A successful call
    pub fn success(dataset: impl Into<String>, phase: Phase, elapsed: Duration) -> Self {
        Self {
            dataset: dataset.into(),
            phase,
            result: OutcomeKind::Success { elapsed },
        }
    }

    /// A failed call
    pub fn failure(dataset: impl Into<String>, phase: Phase, reason: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            phase,
            result: OutcomeKind::Failure {
                reason: reason.into(),
            },
        }
    }

    /// A row that was never dispatched
    pub fn skipped(dataset: impl Into<String>, phase: Phase, reason: SkipReason) -> Self {
        Self {
            dataset: dataset.into(),
            phase,
            result: OutcomeKind::Skipped { reason },
        }
    }

    /// Whether the collaborator call succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeKind::Success { .. })
    }

    /// Whether the collaborator call failed
    pub fn is_failure(&self) -> bool {
        matches!(self.result, OutcomeKind::Failure { .. })
    }
}

/// Run `work` over `rows` with at most `concurrency` calls in flight
///
/// Rows not yet started when `cancel` fires are reported as skipped; calls in flight are
/// dropped and reported as failures. Outcomes come back in input order.
pub(crate) async fn dispatch<'r, Flag, W, Fut>(
    phase: Phase,
    rows: Vec<(&'r mut Record, Flag)>,
    concurrency: usize,
    cancel: &CancellationToken,
    work: W,
) -> Vec<RowOutcome>
where
    W: Fn(&'r mut Record, Flag) -> Fut,
    Fut: Future<Output = RowOutcome>,
{
    let work = &work;
    let mut outcomes: Vec<(usize, RowOutcome)> = stream::iter(rows.into_iter().enumerate())
        .map(|(position, (record, flag))| async move {
            if cancel.is_cancelled() {
                let outcome =
                    RowOutcome::skipped(record.dataset.clone(), phase, SkipReason::Cancelled);
                return (position, outcome);
            }
            let dataset = record.dataset.clone();
            let outcome = tokio::select! {
                outcome = work(record, flag) => outcome,
                _ = cancel.cancelled() => {
                    let reason = Error::Cancelled(format!("{phase} interrupted")).to_string();
                    tracing::warn!(dataset = %dataset, %phase, "row interrupted by cancellation");
                    RowOutcome::failure(dataset, phase, reason)
                }
            };
            (position, outcome)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    outcomes.sort_by_key(|(position, _)| *position);
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Failure text for a call that ran out of time
pub(crate) fn timeout_reason(operation: String, after: Duration) -> String {
    Error::Timeout { operation, after }.to_string()
}
