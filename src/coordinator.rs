//! Run coordinator
//!
//! One run is: load the control file, back it up, retrieve the selected rows, persist, then
//! reselect and convert, and persist again. Row failures only degrade the run; failing to
//! load or persist the file aborts it.

use crate::config::Config;
use crate::conversion::Converter;
use crate::error::{EXIT_DEGRADED, EXIT_OK, Error, Result, RowError};
use crate::executor::{ConversionExecutor, OutcomeKind, RetrievalExecutor, RowOutcome};
use crate::selection::{self, SelectionOptions, SkipReason, Skipped};
use crate::statistics::CatalogStats;
use crate::store::ControlFile;
use crate::transfer::Transfer;
use crate::types::{Phase, PhaseSet};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything that happened in one run
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Per-row, per-phase outcomes; retrieval first, each phase in file order
    pub outcomes: Vec<RowOutcome>,
    /// Rows excluded at load time
    pub rejected: Vec<RowError>,
    /// Control file statistics after the run
    pub stats: CatalogStats,
    /// Why the pre-run backup could not be taken
    pub backup_failure: Option<String>,
}

impl RunSummary {
    /// Outcomes of rows whose collaborator call succeeded
    pub fn succeeded(&self) -> impl Iterator<Item = &RowOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    /// Dataset name and reason of every failed row
    pub fn failed(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.result {
                OutcomeKind::Failure { reason } => Some((o.dataset.as_str(), reason.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Outcomes of rows that were not processed
    pub fn skipped(&self) -> impl Iterator<Item = &RowOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, OutcomeKind::Skipped { .. }))
    }

    /// Whether cancellation kept any row from running
    pub fn was_cancelled(&self) -> bool {
        self.outcomes.iter().any(|o| {
            o.result
                == OutcomeKind::Skipped {
                    reason: SkipReason::Cancelled,
                }
        })
    }

    /// `0` when nothing failed, `1` when any row failed, was rejected or was cut off, or the
    /// backup was missed
    pub fn exit_code(&self) -> i32 {
        if self.failed().is_empty()
            && self.rejected.is_empty()
            && !self.was_cancelled()
            && self.backup_failure.is_none()
        {
            EXIT_OK
        } else {
            EXIT_DEGRADED
        }
    }

    /// Log every failure and rejection, then the totals
    pub fn log(&self) {
        for rejected in &self.rejected {
            tracing::warn!(
                line = rejected.line,
                code = rejected.error_code(),
                "rejected row: {rejected}"
            );
        }
        for outcome in &self.outcomes {
            if let OutcomeKind::Failure { reason } = &outcome.result {
                tracing::warn!(
                    dataset = %outcome.dataset,
                    phase = %outcome.phase,
                    %reason,
                    "row failed"
                );
            }
        }
        tracing::info!(
            succeeded = self.succeeded().count(),
            failed = self.failed().len(),
            skipped = self.skipped().count(),
            rejected = self.rejected.len(),
            "run finished"
        );
    }

    fn record_skips(&mut self, skipped: Vec<Skipped>) {
        self.outcomes.extend(
            skipped
                .into_iter()
                .map(|s| RowOutcome::skipped(s.dataset, s.phase, s.reason)),
        );
    }
}

/// Drives a control file through the requested phases
pub struct Coordinator {
    config: Config,
    retrieval: RetrievalExecutor,
    conversion: ConversionExecutor,
}

impl Coordinator {
    /// Create a coordinator over the given collaborators
    pub fn new(
        config: Config,
        transfer: Arc<dyn Transfer>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        let retrieval =
            RetrievalExecutor::new(transfer, config.workspace.datasets_dir(), &config.transfer);
        let conversion = ConversionExecutor::new(converter, &config.workspace, &config.conversion);
        Self {
            config,
            retrieval,
            conversion,
        }
    }

    /// The configuration this coordinator runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the requested phases over the control file at `path`
    ///
    /// Conversion selection is computed after retrieval has been persisted. A cancelled run
    /// still persists what completed and skips conversion.
    pub async fn execute(
        &self,
        path: &Path,
        phases: PhaseSet,
        options: SelectionOptions,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let mut control = ControlFile::load(path, self.config.delimiter())?;
        let mut summary = RunSummary {
            rejected: control.rejected().cloned().collect(),
            ..Default::default()
        };

        if self.config.control.backup && !phases.is_empty() {
            let backup = control.backup(
                &self.config.workspace.backups_dir(),
                self.config.control.tag.as_deref(),
            );
            if let Err(e) = backup {
                tracing::warn!(path = %path.display(), error = %e, "control file backup failed");
                summary.backup_failure = Some(e.to_string());
            }
        }

        if phases.retrieval {
            let selection = selection::select_for_retrieval(control.records(), &options);
            tracing::info!(
                selected = selection.selected.len(),
                skipped = selection.skipped.len(),
                "retrieval selection"
            );
            let flags: Vec<_> = selection.selected.iter().map(|(_, flag)| *flag).collect();
            let indices = selection.indices();
            summary.record_skips(selection.skipped);

            let rows = control.select_mut(&indices).into_iter().zip(flags).collect();
            let outcomes = self.retrieval.run_all(rows, cancel).await;
            summary.outcomes.extend(outcomes);
            persist(&mut control, &summary)?;
        }

        if phases.conversion {
            let selection = selection::select_for_conversion(control.records(), &options);
            tracing::info!(
                selected = selection.selected.len(),
                skipped = selection.skipped.len(),
                "conversion selection"
            );
            if cancel.is_cancelled() {
                tracing::warn!("run cancelled, conversion phase skipped");
                for (index, _) in &selection.selected {
                    if let Some(record) = control.rows()[*index].record() {
                        summary.outcomes.push(RowOutcome::skipped(
                            record.dataset.clone(),
                            Phase::Conversion,
                            SkipReason::Cancelled,
                        ));
                    }
                }
                summary.record_skips(selection.skipped);
            } else {
                let flags: Vec<_> = selection.selected.iter().map(|(_, flag)| *flag).collect();
                let indices = selection.indices();
                summary.record_skips(selection.skipped);

                let rows = control.select_mut(&indices).into_iter().zip(flags).collect();
                let outcomes = self.conversion.run_all(rows, cancel).await;
                summary.outcomes.extend(outcomes);
                persist(&mut control, &summary)?;
            }
        }

        summary.stats = CatalogStats::from_control(&control);
        summary.stats.log();
        summary.log();
        Ok(summary)
    }

    /// Append rows for new dataset names and save
    ///
    /// Names already present (or repeated in `datasets`) are reported back and not added.
    pub fn add_datasets(&self, path: &Path, datasets: &[String]) -> Result<Vec<Error>> {
        let mut control = ControlFile::load(path, self.config.delimiter())?;
        if self.config.control.backup {
            control.backup(
                &self.config.workspace.backups_dir(),
                self.config.control.tag.as_deref(),
            )?;
        }

        let mut refused = Vec::new();
        for dataset in datasets {
            if let Err(e) = control.append_dataset(dataset) {
                tracing::warn!(dataset = %dataset, error = %e, "dataset not added");
                refused.push(e);
            }
        }
        control.save()?;
        Ok(refused)
    }

    /// Create a control file holding only the header row
    pub fn init(&self, path: &Path) -> Result<()> {
        ControlFile::create(path, self.config.delimiter())?;
        tracing::info!(path = %path.display(), "control file created");
        Ok(())
    }

    /// Summarize the control file at `path`
    pub fn stats(&self, path: &Path) -> Result<CatalogStats> {
        let control = ControlFile::load(path, self.config.delimiter())?;
        Ok(CatalogStats::from_control(&control))
    }
}

fn persist(control: &mut ControlFile, summary: &RunSummary) -> Result<()> {
    if let Err(e) = control.save() {
        tracing::error!(error = %e, "control file could not be persisted");
        summary.log();
        return Err(e);
    }
    Ok(())
}
