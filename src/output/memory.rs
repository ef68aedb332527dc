//! In-memory sink
//!
//! Collects every event in vectors. Used by the CLI when no database is
//! configured, and by tests that need to inspect what a scan emitted.

use crate::output::traits::{
    DiscoveredUrl, ExtractedForm, FingerprintRecord, ScanSink, SinkError, SinkResult,
    StatusReporter,
};
use crate::state::{CrawlStats, ScanStatus};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Events {
    urls: Vec<DiscoveredUrl>,
    forms: Vec<ExtractedForm>,
    fingerprints: Vec<FingerprintRecord>,
    statuses: Vec<ScanStatus>,
    snapshots: Vec<CrawlStats>,
}

/// Sink and status reporter that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Events>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SinkResult<MutexGuard<'_, Events>> {
        self.events.lock().map_err(|_| SinkError::Lock)
    }

    /// Snapshot of a field; a poisoned lock reads as empty
    fn read<T: Clone>(&self, pick: impl FnOnce(&Events) -> &Vec<T>) -> Vec<T> {
        self.lock().map(|events| pick(&*events).clone()).unwrap_or_default()
    }

    pub fn discovered_urls(&self) -> Vec<DiscoveredUrl> {
        self.read(|e| &e.urls)
    }

    pub fn forms(&self) -> Vec<ExtractedForm> {
        self.read(|e| &e.forms)
    }

    pub fn fingerprints(&self) -> Vec<FingerprintRecord> {
        self.read(|e| &e.fingerprints)
    }

    /// Status transitions in the order they were reported
    pub fn statuses(&self) -> Vec<ScanStatus> {
        self.read(|e| &e.statuses)
    }

    pub fn stats_snapshots(&self) -> Vec<CrawlStats> {
        self.read(|e| &e.snapshots)
    }

    /// Fetched URLs in the order they were recorded
    pub fn fetched_urls(&self) -> Vec<String> {
        self.discovered_urls().into_iter().map(|e| e.url).collect()
    }
}

impl ScanSink for MemorySink {
    fn record_discovered_url(&self, event: &DiscoveredUrl) -> SinkResult<()> {
        self.lock()?.urls.push(event.clone());
        Ok(())
    }

    fn record_form(&self, event: &ExtractedForm) -> SinkResult<()> {
        self.lock()?.forms.push(event.clone());
        Ok(())
    }

    fn record_fingerprint(&self, event: &FingerprintRecord) -> SinkResult<()> {
        self.lock()?.fingerprints.push(event.clone());
        Ok(())
    }
}

impl StatusReporter for MemorySink {
    fn report_status(&self, status: ScanStatus) {
        if let Ok(mut events) = self.lock() {
            events.statuses.push(status);
        }
    }

    fn report_stats(&self, stats: &CrawlStats) {
        if let Ok(mut events) = self.lock() {
            events.snapshots.push(stats.clone());
        }
    }
}
