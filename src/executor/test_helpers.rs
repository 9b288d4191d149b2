//! Recording collaborators for executor and coordinator tests

use crate::conversion::{ConvertMode, ConvertReport, Converter, LayoutDescription};
use crate::error::Error;
use crate::transfer::{FetchReport, LayoutHints, Transfer};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Tracks calls in flight and the peak seen
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transfer that records every fetch and fails for configured datasets
#[derive(Default)]
pub(crate) struct MockTransfer {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    delay: Duration,
    in_flight: InFlight,
}

impl MockTransfer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mut self, dataset: &str) -> Self {
        self.failing.insert(dataset.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transfer for MockTransfer {
    async fn fetch(
        &self,
        dataset: &str,
        _hints: &LayoutHints,
        destination: &Path,
    ) -> crate::Result<FetchReport> {
        self.calls.lock().unwrap().push(dataset.to_string());
        self.in_flight.enter();
        tokio::time::sleep(self.delay).await;
        self.in_flight.leave();

        if self.failing.contains(dataset) {
            return Err(Error::Transfer {
                dataset: dataset.to_string(),
                reason: "550 Data set not found".to_string(),
            });
        }
        Ok(FetchReport {
            local_path: destination.join(dataset),
            bytes: 80,
            members: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Converter that records every conversion with its mode
#[derive(Default)]
pub(crate) struct MockConverter {
    calls: Mutex<Vec<(String, ConvertMode)>>,
    failing: HashSet<String>,
    delay: Duration,
    in_flight: InFlight,
}

impl MockConverter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mut self, dataset: &str) -> Self {
        self.failing.insert(dataset.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, ConvertMode)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for MockConverter {
    async fn convert(
        &self,
        dataset: &str,
        _layout: &LayoutDescription,
        _source: &Path,
        mode: ConvertMode,
    ) -> crate::Result<ConvertReport> {
        self.calls.lock().unwrap().push((dataset.to_string(), mode));
        self.in_flight.enter();
        tokio::time::sleep(self.delay).await;
        self.in_flight.leave();

        if self.failing.contains(dataset) {
            return Err(Error::Conversion {
                dataset: dataset.to_string(),
                reason: "dsmigin exited with exit status: 3".to_string(),
            });
        }
        Ok(ConvertReport {
            target: dataset.to_string(),
            members: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
