//! Dataset record: one control file row's attributes and lifecycle state

use crate::error::{Error, Result as DsmigResult};
use crate::types::{self, ConvertFlag, Dsorg, RecordFormat, RetrieveFlag, Volume, VsamType};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timestamp layout written to the control file
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Physical layout of a dataset as described by the source catalog
///
/// These fields come from the control file and are never modified by a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Copybook reference used to decode the records (`COPYBOOK`)
    pub copybook: Option<String>,
    /// Record format (`RECFM`)
    pub recfm: Option<RecordFormat>,
    /// Logical record length (`LRECL`)
    pub lrecl: Option<u32>,
    /// Block size (`BLKSIZE`)
    pub blksize: Option<u32>,
    /// Dataset organization (`DSORG`)
    pub dsorg: Option<Dsorg>,
    /// Volume serial (`VOLSER`)
    pub volume: Option<Volume>,
    /// Owning catalog (`CATALOG`, optional column)
    pub catalog: Option<String>,
    /// VSAM subtype (`VSAM`)
    pub vsam: VsamType,
    /// Key offset (`KEYOFF`)
    pub key_offset: Option<u32>,
    /// Key length (`KEYLEN`)
    pub key_length: Option<u32>,
    /// Maximum record length (`MAXLRECL`)
    pub max_lrecl: Option<u32>,
    /// Average record length (`AVGLRECL`)
    pub avg_lrecl: Option<u32>,
    /// Control interval size (`CISIZE`)
    pub ci_size: Option<u32>,
}

impl Layout {
    /// Whether the dataset sits on a tape volume
    pub fn is_tape(&self) -> bool {
        matches!(self.volume, Some(Volume::Tape))
    }
}

/// Completion state of one phase
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    /// When the phase last completed successfully
    pub completed_at: Option<NaiveDateTime>,
    /// Wall-clock time the successful attempt took
    pub elapsed: Option<Duration>,
}

impl PhaseState {
    /// Whether the phase has a recorded completion
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Forget any prior completion, so a failed retry reads as never attempted
    pub fn clear(&mut self) {
        self.completed_at = None;
        self.elapsed = None;
    }

    /// Record a successful completion
    pub fn complete(&mut self, at: NaiveDateTime, elapsed: Duration) {
        self.completed_at = Some(at);
        self.elapsed = Some(elapsed);
    }
}

/// One dataset's full description and lifecycle state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Dataset name, unique within a control file (`DSN`)
    pub dataset: String,
    /// Physical layout
    pub layout: Layout,
    /// Exclude the row from every phase (`IGNORE`)
    pub ignore: bool,
    /// Retrieval flag (`FTP`)
    pub retrieve: RetrieveFlag,
    /// Conversion flag (`DSMIGIN`)
    pub convert: ConvertFlag,
    /// Retrieval completion (`FTPDATE`, `FTPDURATION`)
    pub retrieval: PhaseState,
    /// Conversion completion (`DSMIGINDATE`, `DSMIGINDURATION`)
    pub conversion: PhaseState,
}

impl Record {
    /// A fresh record with default flags and no layout information
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            layout: Layout::default(),
            ignore: false,
            retrieve: RetrieveFlag::default(),
            convert: ConvertFlag::default(),
            retrieval: PhaseState::default(),
            conversion: PhaseState::default(),
        }
    }
}

/// Refuse a dataset name before it is used in a local path or an ftp command
pub fn validate_dataset_name(dataset: &str) -> DsmigResult<()> {
    types::check_dataset_name(dataset).map_err(|e| Error::InvalidDataset {
        dataset: dataset.to_string(),
        reason: e.reason,
    })
}

/// Current local wall-clock time, truncated to whole seconds
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Render a completion timestamp for the control file
pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a completion timestamp cell
///
/// Accepts the written layout, a bare date (midnight) and RFC 3339 (converted to local time).
pub fn parse_timestamp(s: &str) -> Result<Option<NaiveDateTime>, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
        return Ok(Some(at));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0));
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(Some(at.with_timezone(&Local).naive_local()));
    }
    Err("expected a timestamp like 2024-01-31 13:45:00".to_string())
}

/// Render an elapsed duration as seconds with four decimals
pub fn format_duration(elapsed: &Duration) -> String {
    format!("{:.4}", elapsed.as_secs_f64())
}

/// Parse an elapsed duration cell (seconds, fractional allowed)
pub fn parse_duration(s: &str) -> Result<Option<Duration>, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let secs: f64 = trimmed
        .parse()
        .map_err(|_| "expected a number of seconds".to_string())?;
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| "expected a non-negative number of seconds".to_string())
}
