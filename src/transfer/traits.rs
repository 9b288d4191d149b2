//! Traits and types for dataset retrieval

use crate::record::Layout;
use crate::types::{Dsorg, RecordFormat, Volume};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Layout attributes the transfer needs to pick a retrieval strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutHints {
    /// Dataset organization
    pub dsorg: Option<Dsorg>,
    /// Record format; variable formats need the record descriptor words kept
    pub recfm: Option<RecordFormat>,
    /// Volume the dataset lives on
    pub volume: Option<Volume>,
}

impl LayoutHints {
    /// Extract the hints from a record's layout
    pub fn from_layout(layout: &Layout) -> Self {
        Self {
            dsorg: layout.dsorg,
            recfm: layout.recfm,
            volume: layout.volume.clone(),
        }
    }

    /// Whether the dataset sits on tape
    pub fn is_tape(&self) -> bool {
        matches!(self.volume, Some(Volume::Tape))
    }
}

/// Result of a successful fetch
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Where the dataset landed (a file, or a directory of members for PO)
    pub local_path: PathBuf,
    /// Bytes written locally
    pub bytes: u64,
    /// Members retrieved, for partitioned datasets
    pub members: Option<usize>,
}

/// Trait for retrieving a dataset from the remote host
///
/// An `Err` is reported as a failed retrieval for that row; the scheduler never retries on
/// its own, so implementations that want retries do them inside `fetch`.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Retrieve `dataset` into the `destination` directory
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The dataset cannot be retrieved with the given layout (GDG, migrated volume, ...)
    /// - The remote host refuses or aborts the transfer
    /// - The client binary cannot be executed
    async fn fetch(
        &self,
        dataset: &str,
        hints: &LayoutHints,
        destination: &Path,
    ) -> crate::Result<FetchReport>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
