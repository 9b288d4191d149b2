//! Control file statistics

use crate::error::Result;
use crate::record::{self, Record};
use crate::store::ControlFile;
use crate::types::{ConvertFlag, RetrieveFlag};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Migration progress summary of one control file
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CatalogStats {
    /// Valid rows
    pub datasets: usize,
    /// Valid rows with `IGNORE` set
    pub ignored: usize,
    /// Rows rejected at load time
    pub rejected: usize,
    /// Rows with a retrieval completion
    pub retrieved: usize,
    /// Non-ignored rows a plain run would still retrieve
    pub pending_retrieval: usize,
    /// Rows with a conversion completion
    pub converted: usize,
    /// Non-ignored rows a plain run would still convert
    pub pending_conversion: usize,
    /// Sum of recorded retrieval durations
    pub retrieval_time: Duration,
    /// Sum of recorded conversion durations
    pub conversion_time: Duration,
    retrieval_timed: u32,
    conversion_timed: u32,
}

impl CatalogStats {
    /// Summarize a loaded control file
    pub fn from_control(control: &ControlFile) -> Self {
        let mut stats = Self {
            rejected: control.rejected().count(),
            ..Default::default()
        };
        for (_, record) in control.records() {
            stats.add(record);
        }
        stats
    }

    fn add(&mut self, record: &Record) {
        self.datasets += 1;
        if record.ignore {
            self.ignored += 1;
        }

        if record.retrieval.is_complete() {
            self.retrieved += 1;
        } else if !record.ignore && record.retrieve != RetrieveFlag::No {
            self.pending_retrieval += 1;
        }
        if let Some(elapsed) = record.retrieval.elapsed {
            self.retrieval_time += elapsed;
            self.retrieval_timed += 1;
        }

        if record.conversion.is_complete() {
            self.converted += 1;
        } else if !record.ignore && record.convert != ConvertFlag::No {
            self.pending_conversion += 1;
        }
        if let Some(elapsed) = record.conversion.elapsed {
            self.conversion_time += elapsed;
            self.conversion_timed += 1;
        }
    }

    /// Mean recorded retrieval duration
    pub fn average_retrieval(&self) -> Option<Duration> {
        self.retrieval_time.checked_div(self.retrieval_timed)
    }

    /// Mean recorded conversion duration
    pub fn average_conversion(&self) -> Option<Duration> {
        self.conversion_time.checked_div(self.conversion_timed)
    }

    /// Column name and rendered value, in output order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let optional = |d: Option<Duration>| {
            d.map(|d| record::format_duration(&d)).unwrap_or_default()
        };
        vec![
            ("DATASETS", self.datasets.to_string()),
            ("IGNORED", self.ignored.to_string()),
            ("REJECTED", self.rejected.to_string()),
            ("RETRIEVED", self.retrieved.to_string()),
            ("PENDING_RETRIEVAL", self.pending_retrieval.to_string()),
            ("CONVERTED", self.converted.to_string()),
            ("PENDING_CONVERSION", self.pending_conversion.to_string()),
            ("RETRIEVAL_TIME", record::format_duration(&self.retrieval_time)),
            ("AVG_RETRIEVAL_TIME", optional(self.average_retrieval())),
            ("CONVERSION_TIME", record::format_duration(&self.conversion_time)),
            ("AVG_CONVERSION_TIME", optional(self.average_conversion())),
        ]
    }

    /// Emit the summary as one structured event
    pub fn log(&self) {
        tracing::info!(
            datasets = self.datasets,
            ignored = self.ignored,
            rejected = self.rejected,
            retrieved = self.retrieved,
            pending_retrieval = self.pending_retrieval,
            converted = self.converted,
            pending_conversion = self.pending_conversion,
            retrieval_secs = self.retrieval_time.as_secs_f64(),
            conversion_secs = self.conversion_time.as_secs_f64(),
            "control file statistics"
        );
    }

    /// Write a one-row CSV snapshot named `<stem>[_<tag>]_<YYYYmmdd_HHMMSS>_statistics.csv`
    pub fn write_csv(&self, dir: &Path, stem: &str, tag: Option<&str>) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let name = match tag {
            Some(tag) if !tag.is_empty() => format!("{stem}_{tag}_{stamp}_statistics.csv"),
            _ => format!("{stem}_{stamp}_statistics.csv"),
        };
        let target = dir.join(name);

        let fields = self.fields();
        let mut writer = csv::Writer::from_path(&target)?;
        writer.write_record(fields.iter().map(|(name, _)| *name))?;
        writer.write_record(fields.iter().map(|(_, value)| value.as_str()))?;
        writer.flush()?;

        tracing::info!(path = %target.display(), "statistics written");
        Ok(target)
    }
}
