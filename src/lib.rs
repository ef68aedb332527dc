//! webrecon: a reconnaissance crawler for web application security scans
//!
//! Given a target URL and a [`ScanConfig`], the crawler discovers reachable
//! pages, extracts links, forms and technology signals, and hands every
//! finding to an injected sink. It respects robots.txt, rate limits and
//! scope rules, and keeps going when individual URLs fail.

pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for scan-level failures
///
/// Per-URL problems never surface here; they are counted in
/// [`state::CrawlStats::errors`] and the scan continues.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initialise HTTP client: {0}")]
    ClientInit(#[source] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Frontier drain protocol broken: {0}")]
    Barrier(String),

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("Session error: {0}")]
    Session(#[from] crawler::SessionError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scan status transition: {from} -> {to}")]
    InvalidTransition {
        from: state::ScanStatus,
        to: state::ScanStatus,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for scan operations
pub type Result<T> = std::result::Result<T, ReconError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{AuthConfig, AuthKind, ScanConfig};
pub use crawler::{Engine, FetchResult, Fingerprinter, ParsedPage, SessionManager, Spider};
pub use output::{MemorySink, ScanSink, StatusReporter};
pub use state::{CrawlStats, ScanStatus};
pub use url::{is_valid_url, normalize_url, registrable_domain, Normalizer, ScopeMatcher};
