//! Sink and status-reporter traits and the events passed through them
//!
//! The crawler never stores anything itself. Every finding is turned into
//! one of the event records below and handed to an injected [`ScanSink`];
//! lifecycle changes and progress snapshots go to a [`StatusReporter`].

use crate::crawler::{FetchResult, Form, TechnologyFingerprint};
use crate::state::{CrawlStats, ScanStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by sinks
///
/// The engine logs these and carries on; only the failing event is lost.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Sink lock poisoned")]
    Lock,
}

impl From<rusqlite::Error> for SinkError {
    fn from(e: rusqlite::Error) -> Self {
        SinkError::Storage(e.to_string())
    }
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// A fetched URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredUrl {
    pub url: String,
    /// Page the URL was linked from; None for the target
    pub parent_url: Option<String>,
    pub method: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub response_time_ms: u64,
    pub page_title: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredUrl {
    pub fn from_fetch(result: &FetchResult, parent_url: Option<&str>) -> Self {
        Self {
            url: result.url.clone(),
            parent_url: parent_url.map(str::to_string),
            method: "GET".to_string(),
            status_code: result.status_code,
            content_type: result.content_type.clone(),
            content_length: result.content_length,
            response_time_ms: result.response_time_ms,
            page_title: result.title.clone(),
            discovered_at: Utc::now(),
        }
    }
}

/// A form found on a fetched page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedForm {
    /// URL of the page holding the form
    pub url_ref: String,
    pub action: String,
    pub method: String,
    pub fields: serde_json::Value,
    pub csrf_tokens: serde_json::Value,
    pub authentication_required: bool,
}

impl ExtractedForm {
    pub fn from_form(url_ref: &str, form: &Form) -> SinkResult<Self> {
        Ok(Self {
            url_ref: url_ref.to_string(),
            action: form.action.clone(),
            method: form.method.clone(),
            fields: serde_json::to_value(&form.fields)?,
            csrf_tokens: serde_json::to_value(&form.csrf_tokens)?,
            authentication_required: form.authentication_required,
        })
    }
}

/// Technology and security-header findings for one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintRecord {
    pub url_ref: String,
    pub server_software: Option<String>,
    /// Comma-separated when several were detected
    pub programming_language: Option<String>,
    pub framework: Option<String>,
    pub cms: Option<String>,
    pub javascript_libraries: serde_json::Value,
    pub security_headers: serde_json::Value,
}

impl FingerprintRecord {
    pub fn from_fingerprint(url_ref: &str, fingerprint: &TechnologyFingerprint) -> SinkResult<Self> {
        Ok(Self {
            url_ref: url_ref.to_string(),
            server_software: fingerprint.server_software.clone(),
            programming_language: join_non_empty(&fingerprint.programming_language),
            framework: join_non_empty(&fingerprint.framework),
            cms: fingerprint.cms.clone(),
            javascript_libraries: serde_json::to_value(&fingerprint.javascript_libraries)?,
            security_headers: serde_json::to_value(&fingerprint.security_headers)?,
        })
    }
}

fn join_non_empty(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

/// Receives every finding of a scan
///
/// Implementations must be thread-safe; workers call these concurrently.
pub trait ScanSink: Send + Sync {
    /// Records a fetched URL
    fn record_discovered_url(&self, event: &DiscoveredUrl) -> SinkResult<()>;

    /// Records a form extracted from a page
    fn record_form(&self, event: &ExtractedForm) -> SinkResult<()>;

    /// Records the fingerprint of a page
    fn record_fingerprint(&self, event: &FingerprintRecord) -> SinkResult<()>;
}

/// Receives status transitions and periodic stats snapshots
pub trait StatusReporter: Send + Sync {
    fn report_status(&self, status: ScanStatus);

    fn report_stats(&self, stats: &CrawlStats);
}

/// Reporter that writes everything to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter;

impl StatusReporter for LoggingReporter {
    fn report_status(&self, status: ScanStatus) {
        tracing::info!("Scan status: {}", status);
    }

    fn report_stats(&self, stats: &CrawlStats) {
        tracing::info!(
            "Progress: {} crawled, {} discovered, {} forms, {} errors, {:.2} pages/sec",
            stats.urls_crawled,
            stats.urls_discovered,
            stats.forms_found,
            stats.errors,
            stats.pages_per_second()
        );
    }
}
