//! Recording collaborators

use async_trait::async_trait;
use dsmig::{
    ConvertMode, ConvertReport, Converter, Error, FetchReport, LayoutDescription, LayoutHints,
    Transfer,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Transfer that records fetches and fails for the named datasets
#[derive(Default)]
pub struct RecordingTransfer {
    pub calls: Mutex<Vec<String>>,
    pub failing: HashSet<String>,
    pub delay: Duration,
}

impl RecordingTransfer {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transfer for RecordingTransfer {
    async fn fetch(
        &self,
        dataset: &str,
        _hints: &LayoutHints,
        destination: &Path,
    ) -> dsmig::Result<FetchReport> {
        self.calls.lock().unwrap().push(dataset.to_string());
        tokio::time::sleep(self.delay).await;
        if self.failing.contains(dataset) {
            return Err(Error::Transfer {
                dataset: dataset.to_string(),
                reason: "550 Data set not found".to_string(),
            });
        }
        Ok(FetchReport {
            local_path: destination.join(dataset),
            bytes: 27920,
            members: None,
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Converter that records conversions and fails for the named datasets
#[derive(Default)]
pub struct RecordingConverter {
    pub calls: Mutex<Vec<(String, ConvertMode)>>,
    pub failing: HashSet<String>,
}

impl RecordingConverter {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, ConvertMode)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for RecordingConverter {
    async fn convert(
        &self,
        dataset: &str,
        _layout: &LayoutDescription,
        _source: &Path,
        mode: ConvertMode,
    ) -> dsmig::Result<ConvertReport> {
        self.calls.lock().unwrap().push((dataset.to_string(), mode));
        if self.failing.contains(dataset) {
            return Err(Error::Conversion {
                dataset: dataset.to_string(),
                reason: "dsmigin exited with exit status: 8".to_string(),
            });
        }
        Ok(ConvertReport {
            target: dataset.to_string(),
            members: None,
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
