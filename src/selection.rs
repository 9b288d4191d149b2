//! Selection engine: which rows each phase works on this run
//!
//! Both selections walk the records in file order. `ignore` is checked first and wins over
//! every flag and override; then the run overrides turn into an effective flag, and the
//! effective flag together with the phase's completion state decides eligibility.

use crate::record::Record;
use crate::types::{ConvertFlag, Phase, RetrieveFlag};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Run-wide selection overrides
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOptions {
    /// Retrieve at most this many eligible rows (first ones in file order)
    pub max_rows: Option<usize>,
    /// Treat every non-ignored row's flag as `Force`
    pub force: bool,
    /// Treat every non-ignored row's conversion flag as `ConvertOnly`
    pub convert_only: bool,
}

/// Why a row was left out of a phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `IGNORE` is set
    Ignored,
    /// The effective flag is `No`
    FlagNo,
    /// Flag `Yes` and the phase already completed
    AlreadyCompleted,
    /// Eligible, but past the row-count cap
    BeyondCap,
    /// Eligible, but the run was cancelled before it was dispatched
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Ignored => "ignored",
            SkipReason::FlagNo => "flag is N",
            SkipReason::AlreadyCompleted => "already completed",
            SkipReason::BeyondCap => "beyond row-count cap",
            SkipReason::Cancelled => "run cancelled",
        };
        f.write_str(text)
    }
}

/// A row left out of a phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skipped {
    /// Dataset name
    pub dataset: String,
    /// Phase it was left out of
    pub phase: Phase,
    /// Why
    pub reason: SkipReason,
}

/// Rows chosen for one phase, with the effective flag each is processed under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection<F> {
    /// Row index and effective flag, in file order
    pub selected: Vec<(usize, F)>,
    /// Rows left out, in file order
    pub skipped: Vec<Skipped>,
}

impl<F> Default for Selection<F> {
    fn default() -> Self {
        Self {
            selected: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<F> Selection<F> {
    /// Row indices of the selected rows
    pub fn indices(&self) -> Vec<usize> {
        self.selected.iter().map(|(index, _)| *index).collect()
    }

    /// Whether nothing was selected
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    fn skip(&mut self, record: &Record, phase: Phase, reason: SkipReason) {
        tracing::debug!(dataset = %record.dataset, %phase, %reason, "row not selected");
        self.skipped.push(Skipped {
            dataset: record.dataset.clone(),
            phase,
            reason,
        });
    }
}

/// Retrieval flag a row is processed under this run
pub fn effective_retrieve_flag(record: &Record, options: &SelectionOptions) -> RetrieveFlag {
    if options.force {
        RetrieveFlag::Force
    } else {
        record.retrieve
    }
}

/// Conversion flag a row is processed under this run; convert-only beats force
pub fn effective_convert_flag(record: &Record, options: &SelectionOptions) -> ConvertFlag {
    if options.convert_only {
        ConvertFlag::ConvertOnly
    } else if options.force {
        ConvertFlag::Force
    } else {
        record.convert
    }
}

/// Choose the rows to retrieve
///
/// The row-count cap keeps the first `max_rows` eligible rows; later eligible rows are
/// reported as [`SkipReason::BeyondCap`].
pub fn select_for_retrieval<'a>(
    records: impl IntoIterator<Item = (usize, &'a Record)>,
    options: &SelectionOptions,
) -> Selection<RetrieveFlag> {
    let mut selection = Selection::default();
    for (index, record) in records {
        if record.ignore {
            selection.skip(record, Phase::Retrieval, SkipReason::Ignored);
            continue;
        }
        let flag = effective_retrieve_flag(record, options);
        let eligible = match flag {
            RetrieveFlag::No => Err(SkipReason::FlagNo),
            RetrieveFlag::Yes if record.retrieval.is_complete() => {
                Err(SkipReason::AlreadyCompleted)
            }
            RetrieveFlag::Yes | RetrieveFlag::Force => Ok(()),
        };
        match eligible {
            Err(reason) => selection.skip(record, Phase::Retrieval, reason),
            Ok(()) if options.max_rows.is_some_and(|cap| selection.selected.len() >= cap) => {
                selection.skip(record, Phase::Retrieval, SkipReason::BeyondCap)
            }
            Ok(()) => selection.selected.push((index, flag)),
        }
    }
    selection
}

/// Choose the rows to convert
pub fn select_for_conversion<'a>(
    records: impl IntoIterator<Item = (usize, &'a Record)>,
    options: &SelectionOptions,
) -> Selection<ConvertFlag> {
    let mut selection = Selection::default();
    for (index, record) in records {
        if record.ignore {
            selection.skip(record, Phase::Conversion, SkipReason::Ignored);
            continue;
        }
        let flag = effective_convert_flag(record, options);
        match flag {
            ConvertFlag::No => selection.skip(record, Phase::Conversion, SkipReason::FlagNo),
            ConvertFlag::Yes if record.conversion.is_complete() => {
                selection.skip(record, Phase::Conversion, SkipReason::AlreadyCompleted)
            }
            ConvertFlag::Yes | ConvertFlag::Force | ConvertFlag::ConvertOnly => {
                selection.selected.push((index, flag))
            }
        }
    }
    selection
}
