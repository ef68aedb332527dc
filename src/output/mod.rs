//! Output module: where scan findings go
//!
//! This module handles:
//! - The [`ScanSink`] and [`StatusReporter`] traits the engine reports through
//! - Event records for discovered URLs, forms and fingerprints
//! - An in-memory sink and a SQLite sink
//! - Printing final statistics

mod memory;
mod sqlite_output;
pub mod stats;
mod traits;

pub use memory::MemorySink;
pub use sqlite_output::SqliteSink;
pub use stats::{format_statistics, print_findings, print_statistics, technology_counts};
pub use traits::{
    DiscoveredUrl, ExtractedForm, FingerprintRecord, LoggingReporter, ScanSink, SinkError,
    SinkResult, StatusReporter,
};
