//! Crawler module: fetching, parsing and scan orchestration
//!
//! This module contains the core crawling logic, including:
//! - The scan engine and its worker pool
//! - The shared frontier with its outstanding-work barrier
//! - Global and per-host rate limiting
//! - robots-aware HTTP fetching
//! - HTML parsing, authentication and technology fingerprinting

mod engine;
mod fingerprint;
mod frontier;
mod limiter;
mod parser;
mod session;
mod spider;

pub use engine::{Engine, MAX_WORKERS};
pub use fingerprint::{
    Category, Fingerprinter, Remediation, SecurityHeaderAudit, Technology, TechnologyFingerprint,
};
pub use frontier::{Frontier, FrontierEntry, Offer, Pop};
pub use limiter::{HostLimiter, HostPermit, RateLimiter};
pub use parser::{
    extract_csrf_tokens, extract_title, first_form, is_csrf_field, parse, CsrfToken, Form,
    FormField, Heading, Image, MetaTag, ParsedPage, Script, SelectOption,
};
pub use session::{SessionError, SessionManager, SessionState};
pub use spider::{build_http_client, FetchError, FetchResult, Spider};
