//! Configuration module for webrecon
//!
//! This module handles loading, parsing, and validating TOML scan
//! configurations. A [`ScanConfig`] can also be built directly in code with
//! [`ScanConfig::new`], which fills every field except the target with its
//! default.
//!
//! # Example
//!
//! ```no_run
//! use webrecon::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scan.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.scan.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuthConfig, AuthKind, Config, OutputConfig, ScanConfig, DEFAULT_EXCLUDED_EXTENSIONS,
    DEFAULT_TRACKING_PARAMS,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate_scan_config;
