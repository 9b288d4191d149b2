//! Transfer used when retrieval is not configured

use super::traits::{FetchReport, LayoutHints, Transfer};
use async_trait::async_trait;
use std::path::Path;

/// Transfer that fails every fetch with [`crate::Error::NotSupported`]
///
/// Lets conversion-only runs start without an ftp client or host. Any row that does get
/// selected for retrieval fails with the configured explanation.
///
/// # Examples
///
/// ```
/// use dsmig::transfer::{LayoutHints, Transfer, UnavailableTransfer};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() {
/// let transfer = UnavailableTransfer::new("transfer.host is not set");
/// let result = transfer
///     .fetch("HLQ.DATA", &LayoutHints::default(), Path::new("."))
///     .await;
/// assert!(result.is_err());
/// # }
/// ```
pub struct UnavailableTransfer {
    reason: String,
}

impl UnavailableTransfer {
    /// Create with the explanation reported for every fetch
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Transfer for UnavailableTransfer {
    async fn fetch(
        &self,
        _dataset: &str,
        _hints: &LayoutHints,
        _destination: &Path,
    ) -> crate::Result<FetchReport> {
        Err(crate::Error::NotSupported(format!(
            "retrieval is unavailable: {}",
            self.reason
        )))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
