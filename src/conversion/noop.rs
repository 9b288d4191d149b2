//! Converter used when the conversion tools are not available

use super::traits::{ConvertMode, ConvertReport, Converter, LayoutDescription};
use async_trait::async_trait;
use std::path::Path;

/// Converter that fails every conversion with [`crate::Error::NotSupported`]
///
/// Lets retrieval-only runs start on a machine without the conversion tools.
pub struct UnavailableConverter {
    reason: String,
}

impl UnavailableConverter {
    /// Create with the explanation reported for every conversion
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Converter for UnavailableConverter {
    async fn convert(
        &self,
        _dataset: &str,
        _layout: &LayoutDescription,
        _source: &Path,
        _mode: ConvertMode,
    ) -> crate::Result<ConvertReport> {
        Err(crate::Error::NotSupported(format!(
            "conversion is unavailable: {}",
            self.reason
        )))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
