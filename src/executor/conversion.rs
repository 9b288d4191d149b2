//! Conversion executor

use super::{RowOutcome, dispatch, timeout_reason};
use crate::config::{ConversionConfig, WorkspaceConfig};
use crate::conversion::{ConvertMode, Converter, LayoutDescription};
use crate::record::{self, Record};
use crate::types::{ConvertFlag, Phase};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Runs the decode/load collaborator for selected rows and records completions
pub struct ConversionExecutor {
    converter: Arc<dyn Converter>,
    source_dir: PathBuf,
    copybook_dir: PathBuf,
    timeout: Duration,
    max_concurrent: usize,
}

impl ConversionExecutor {
    /// Create an executor reading retrieved copies from the workspace
    pub fn new(
        converter: Arc<dyn Converter>,
        workspace: &WorkspaceConfig,
        config: &ConversionConfig,
    ) -> Self {
        Self {
            converter,
            source_dir: workspace.datasets_dir(),
            copybook_dir: workspace.copybook_dir(),
            timeout: config.timeout,
            max_concurrent: config.max_concurrent,
        }
    }

    /// Convert one row
    ///
    /// `ConvertOnly` runs as a dry run and leaves the record exactly as it was, whatever the
    /// outcome. `Force` clears the previous completion before the attempt.
    pub async fn run(&self, record: &mut Record, flag: ConvertFlag) -> RowOutcome {
        let mode = match flag {
            ConvertFlag::ConvertOnly => ConvertMode::DryRun,
            _ => ConvertMode::Load,
        };
        if flag == ConvertFlag::Force {
            record.conversion.clear();
        }

        let layout =
            LayoutDescription::resolve(&record.dataset, &record.layout, &self.copybook_dir);
        let source = self.source_dir.join(&record.dataset);
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.timeout,
            self.converter
                .convert(&record.dataset, &layout, &source, mode),
        )
        .await;
        let elapsed = started.elapsed();

        match result {
            Ok(Ok(report)) => {
                if mode == ConvertMode::Load {
                    record.conversion.complete(record::now(), elapsed);
                }
                tracing::info!(
                    dataset = %record.dataset,
                    phase = %Phase::Conversion,
                    elapsed_ms = elapsed.as_millis() as u64,
                    dry_run = mode == ConvertMode::DryRun,
                    target = %report.target,
                    converter = self.converter.name(),
                    "conversion succeeded"
                );
                RowOutcome::success(record.dataset.clone(), Phase::Conversion, elapsed)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    dataset = %record.dataset,
                    phase = %Phase::Conversion,
                    error = %e,
                    "conversion failed"
                );
                RowOutcome::failure(record.dataset.clone(), Phase::Conversion, e.to_string())
            }
            Err(_) => {
                let reason = timeout_reason(format!("convert {}", record.dataset), self.timeout);
                tracing::warn!(
                    dataset = %record.dataset,
                    phase = %Phase::Conversion,
                    %reason,
                    "conversion timed out"
                );
                RowOutcome::failure(record.dataset.clone(), Phase::Conversion, reason)
            }
        }
    }

    /// Convert every selected row, at most `conversion.max_concurrent` at a time
    pub async fn run_all(
        &self,
        rows: Vec<(&mut Record, ConvertFlag)>,
        cancel: &CancellationToken,
    ) -> Vec<RowOutcome> {
        dispatch(
            Phase::Conversion,
            rows,
            self.max_concurrent,
            cancel,
            |record, flag| self.run(record, flag),
        )
        .await
    }
}
