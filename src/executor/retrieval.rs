//! Retrieval executor

use super::{RowOutcome, dispatch, timeout_reason};
use crate::config::TransferConfig;
use crate::record::{self, Record};
use crate::transfer::{LayoutHints, Transfer};
use crate::types::{Phase, RetrieveFlag};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Runs the transfer collaborator for selected rows and records completions
pub struct RetrievalExecutor {
    transfer: Arc<dyn Transfer>,
    destination: PathBuf,
    timeout: Duration,
    max_concurrent: usize,
}

impl RetrievalExecutor {
    /// Create an executor fetching into `destination`
    pub fn new(
        transfer: Arc<dyn Transfer>,
        destination: PathBuf,
        config: &TransferConfig,
    ) -> Self {
        Self {
            transfer,
            destination,
            timeout: config.timeout,
            max_concurrent: config.max_concurrent,
        }
    }

    /// Retrieve one row
    ///
    /// A forced attempt clears the previous completion first, so a failure leaves the row
    /// reading as never retrieved. Conversion state is never touched.
    pub async fn run(&self, record: &mut Record, flag: RetrieveFlag) -> RowOutcome {
        if flag == RetrieveFlag::Force {
            record.retrieval.clear();
        }

        let hints = LayoutHints::from_layout(&record.layout);
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.timeout,
            self.transfer.fetch(&record.dataset, &hints, &self.destination),
        )
        .await;
        let elapsed = started.elapsed();

        match result {
            Ok(Ok(report)) => {
                record.retrieval.complete(record::now(), elapsed);
                tracing::info!(
                    dataset = %record.dataset,
                    phase = %Phase::Retrieval,
                    elapsed_ms = elapsed.as_millis() as u64,
                    bytes = report.bytes,
                    transfer = self.transfer.name(),
                    "retrieval succeeded"
                );
                RowOutcome::success(record.dataset.clone(), Phase::Retrieval, elapsed)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    dataset = %record.dataset,
                    phase = %Phase::Retrieval,
                    error = %e,
                    "retrieval failed"
                );
                RowOutcome::failure(record.dataset.clone(), Phase::Retrieval, e.to_string())
            }
            Err(_) => {
                let reason = timeout_reason(format!("fetch {}", record.dataset), self.timeout);
                tracing::warn!(
                    dataset = %record.dataset,
                    phase = %Phase::Retrieval,
                    %reason,
                    "retrieval timed out"
                );
                RowOutcome::failure(record.dataset.clone(), Phase::Retrieval, reason)
            }
        }
    }

    /// Retrieve every selected row, at most `transfer.max_concurrent` at a time
    pub async fn run_all(
        &self,
        rows: Vec<(&mut Record, RetrieveFlag)>,
        cancel: &CancellationToken,
    ) -> Vec<RowOutcome> {
        dispatch(
            Phase::Retrieval,
            rows,
            self.max_concurrent,
            cancel,
            |record, flag| self.run(record, flag),
        )
        .await
    }
}
